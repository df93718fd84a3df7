//! Parameters structure for the manoeuvre controllers

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use super::MnvrError;
use crate::cmd_map::CommandMapKind;
use crate::pid::PidGains;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Longest allowed control tick.
///
/// Units: seconds
pub const MAX_CYCLE_PERIOD_S: f64 = 1.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the drive and turn controllers.
#[derive(Debug, Clone, Deserialize)]
pub struct MnvrParams {

    // ---- TIMING ----

    /// Period of one control tick.
    ///
    /// Units: seconds
    #[serde(default = "default_cycle_period_s")]
    pub cycle_period_s: f64,

    /// A manoeuvre completes once the error has been within tolerance for
    /// more than this many consecutive ticks.
    #[serde(default = "default_settle_ticks")]
    pub settle_ticks: u32,

    /// Maximum duration of a single manoeuvre. `None` allows a manoeuvre to
    /// run until it completes or is cancelled.
    ///
    /// Units: seconds
    #[serde(default)]
    pub max_duration_s: Option<f64>,

    /// Maximum age of a sensor reading before the manoeuvre is aborted.
    ///
    /// Units: seconds
    #[serde(default)]
    pub sensor_stale_limit_s: Option<f64>,

    // ---- OUTPUT SHAPING ----

    /// Maximum rate of change of each side's demand. `None` disables slew
    /// limiting.
    ///
    /// Units: demand/second
    #[serde(default)]
    pub slew_max_accel: Option<f64>,

    /// Linearisation applied to the side demands.
    #[serde(default)]
    pub command_map: CommandMapKind,

    // ---- GAINS ----

    /// Distance loop, encoder ticks in, demand out.
    pub distance_pid: PidGains,

    /// Heading hold loop used while driving, degrees in, demand out.
    pub heading_hold_pid: PidGains,

    /// Turn to heading loop, degrees in, demand out.
    pub turn_pid: PidGains,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MnvrParams {
    /// Check the parameters are usable.
    pub fn validate(&self) -> Result<(), MnvrError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;

        if !(positive(self.cycle_period_s) && self.cycle_period_s <= MAX_CYCLE_PERIOD_S) {
            return Err(MnvrError::InvalidParams(format!(
                "cycle_period_s must be in (0, {}], got {}",
                MAX_CYCLE_PERIOD_S, self.cycle_period_s
            )));
        }

        let optionals = [
            ("max_duration_s", self.max_duration_s),
            ("sensor_stale_limit_s", self.sensor_stale_limit_s),
            ("slew_max_accel", self.slew_max_accel),
        ];
        for (name, value) in optionals.iter() {
            if let Some(v) = value {
                if !positive(*v) {
                    return Err(MnvrError::InvalidParams(format!(
                        "{} must be positive if set, got {}",
                        name, v
                    )));
                }
            }
        }

        let gains = [
            ("distance_pid", &self.distance_pid),
            ("heading_hold_pid", &self.heading_hold_pid),
            ("turn_pid", &self.turn_pid),
        ];
        for (name, g) in gains.iter() {
            if !g.is_valid() {
                return Err(MnvrError::InvalidParams(format!(
                    "{} contains invalid gains: {:?}",
                    name, g
                )));
            }
        }

        Ok(())
    }
}

fn default_cycle_period_s() -> f64 {
    0.02
}

fn default_settle_ticks() -> u32 {
    12
}
