//! # Simulated drive base
//!
//! A simple kinematic model of a differential drive robot, used to run the
//! manoeuvre controllers without hardware. Forward speed and yaw rate are
//! both proportional to the mean side demands.
//!
//! In lockstep mode time only advances when the controller sleeps, so whole
//! manoeuvres run deterministically and much faster than real time. The robot
//! then also owns the `HeadingTracker`, stepped with the plant. In realtime
//! mode the plant follows the system clock and the heading must be tracked
//! by a `HeadingTask` using the robot as its gyro.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// Internal
use crate::hal::{Clock, DriveBase, EncoderReading, HalError, MotorDemands, RateGyro, SystemClock};
use crate::heading::{HeadingHandle, HeadingTracker};
use util::maths::wrap_deg_180;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of most recent demands kept by the robot.
pub const DEMAND_HISTORY_LEN: usize = 10_000;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the simulated plant.
#[derive(Debug, Clone, Deserialize)]
pub struct SimParams {
    /// Encoder rate per unit of mean forward demand.
    ///
    /// Units: ticks/second
    pub ticks_per_cmd_s: f64,

    /// Yaw rate per unit of mean turn demand.
    ///
    /// Units: degrees/second
    pub dps_per_cmd: f64,

    /// Constant yaw disturbance, e.g. from uneven motors.
    ///
    /// Units: degrees/second
    #[serde(default)]
    pub yaw_disturbance_dps: f64,

    /// Heading at the start of the simulation.
    ///
    /// Units: degrees
    #[serde(default)]
    pub initial_heading_deg: f64,
}

/// Handle onto a shared simulated robot.
#[derive(Clone)]
pub struct SimRobot {
    plant: Arc<Mutex<Plant>>,
    timing: Timing,
}

/// A manually advanced clock. `sleep` advances the time immediately.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    time_ms: Arc<Mutex<f64>>,
}

struct Plant {
    params: SimParams,
    time_ms: f64,
    encoder_ticks: f64,
    demands: MotorDemands,
    true_heading_deg: f64,
    tracker: Option<HeadingTracker>,
    history: VecDeque<MotorDemands>,
}

#[derive(Clone, Copy)]
enum Timing {
    Lockstep,
    Realtime(SystemClock),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimRobot {
    /// Create a robot whose time only advances through `Clock::sleep`.
    pub fn lockstep(params: SimParams) -> Self {
        let tracker = HeadingTracker::with_angle(params.initial_heading_deg, 0.0);

        Self {
            plant: Arc::new(Mutex::new(Plant::new(params, 0.0, Some(tracker)))),
            timing: Timing::Lockstep,
        }
    }

    /// Create a robot which follows the given system clock.
    pub fn realtime(params: SimParams, clock: SystemClock) -> Self {
        Self {
            plant: Arc::new(Mutex::new(Plant::new(params, clock.now_ms(), None))),
            timing: Timing::Realtime(clock),
        }
    }

    /// Heading estimate tracked by the robot itself, only present in lockstep
    /// mode.
    pub fn heading(&self) -> Option<HeadingHandle> {
        self.plant().tracker.as_ref().map(|t| t.handle())
    }

    /// Exact heading of the simulated robot.
    pub fn true_heading_deg(&self) -> f64 {
        self.synced().true_heading_deg
    }

    /// Exact encoder position, before quantisation.
    pub fn encoder_ticks(&self) -> f64 {
        self.synced().encoder_ticks
    }

    /// The last `DEMAND_HISTORY_LEN` demands sent to the robot, oldest
    /// first.
    pub fn demand_history(&self) -> Vec<MotorDemands> {
        self.plant().history.iter().copied().collect()
    }

    fn plant(&self) -> MutexGuard<'_, Plant> {
        self.plant.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the plant, bringing it up to date first in realtime mode.
    fn synced(&self) -> MutexGuard<'_, Plant> {
        let mut plant = self.plant();
        if let Timing::Realtime(clock) = self.timing {
            let dt_ms = clock.now_ms() - plant.time_ms;
            plant.step(dt_ms);
        }
        plant
    }
}

impl DriveBase for SimRobot {
    fn encoder(&mut self) -> Result<EncoderReading, HalError> {
        let plant = self.synced();

        Ok(EncoderReading {
            ticks: plant.encoder_ticks.round() as i64,
            timestamp_ms: Some(plant.time_ms),
        })
    }

    fn reset_encoder(&mut self) -> Result<(), HalError> {
        self.synced().encoder_ticks = 0.0;
        Ok(())
    }

    fn send_demands(&mut self, dems: &MotorDemands) -> Result<(), HalError> {
        let mut plant = self.synced();
        plant.demands = *dems;
        if plant.history.len() == DEMAND_HISTORY_LEN {
            plant.history.pop_front();
        }
        plant.history.push_back(*dems);
        Ok(())
    }
}

impl RateGyro for SimRobot {
    fn rate_dps(&mut self) -> Result<f64, HalError> {
        Ok(self.synced().yaw_rate_dps())
    }
}

impl Clock for SimRobot {
    fn now_ms(&self) -> f64 {
        match self.timing {
            Timing::Lockstep => self.plant().time_ms,
            Timing::Realtime(clock) => clock.now_ms(),
        }
    }

    fn sleep(&self, duration: Duration) {
        match self.timing {
            Timing::Lockstep => self.plant().step(duration.as_secs_f64() * 1000.0),
            Timing::Realtime(clock) => clock.sleep(duration),
        }
    }
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, duration: Duration) {
        *self.time_ms.lock().unwrap_or_else(PoisonError::into_inner) +=
            duration.as_secs_f64() * 1000.0;
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> f64 {
        *self.time_ms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration)
    }
}

impl Plant {
    fn new(params: SimParams, time_ms: f64, tracker: Option<HeadingTracker>) -> Self {
        let true_heading_deg = wrap_deg_180(params.initial_heading_deg);

        Self {
            params,
            time_ms,
            encoder_ticks: 0.0,
            demands: MotorDemands::stop(),
            true_heading_deg,
            tracker,
            history: VecDeque::new(),
        }
    }

    /// Mean forward and turn demands. Positive turn is left side forward.
    fn fwd_turn(&self) -> (f64, f64) {
        let d = &self.demands;
        let left = (d.front_left + d.rear_left) as f64 / 2.0;
        let right = (d.front_right + d.rear_right) as f64 / 2.0;

        ((left + right) / 2.0, (left - right) / 2.0)
    }

    fn yaw_rate_dps(&self) -> f64 {
        self.fwd_turn().1 * self.params.dps_per_cmd + self.params.yaw_disturbance_dps
    }

    fn step(&mut self, dt_ms: f64) {
        if dt_ms <= 0.0 {
            return;
        }

        let dt_s = dt_ms / 1000.0;
        let (fwd, _) = self.fwd_turn();
        let yaw_rate_dps = self.yaw_rate_dps();

        self.encoder_ticks += fwd * self.params.ticks_per_cmd_s * dt_s;
        self.true_heading_deg = wrap_deg_180(self.true_heading_deg + yaw_rate_dps * dt_s);
        self.time_ms += dt_ms;

        if let Some(ref mut tracker) = self.tracker {
            tracker.update(self.time_ms, yaw_rate_dps);
        }
    }
}
