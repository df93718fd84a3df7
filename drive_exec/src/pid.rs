//! # PID controller
//!
//! The manoeuvre controllers only rely on the `Pid` trait, so any PID
//! implementation can be dropped in. `PidController` is the default one.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use util::{maths::clamp_abs, time::ms_to_s};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A PID evaluation primitive.
pub trait Pid {
    /// Get the correction for the given target and measurement.
    ///
    /// `now_ms` is used to derive the time step between successive calls.
    fn calculate(&mut self, target: f64, measurement: f64, now_ms: f64) -> f64;

    /// Forget any accumulated integral and derivative history.
    fn reset(&mut self);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gains and limits for a single PID loop.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
pub struct PidGains {
    /// Proportional gain
    pub k_p: f64,

    /// Integral gain
    #[serde(default)]
    pub k_i: f64,

    /// Derivative gain
    #[serde(default)]
    pub k_d: f64,

    /// Maximum magnitude of the integral accumulator.
    #[serde(default)]
    pub i_max: Option<f64>,

    /// Maximum magnitude of the output.
    #[serde(default)]
    pub output_limit: Option<f64>,
}

/// A time aware PID controller.
#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,

    /// Time of the previous call
    prev_time_ms: Option<f64>,

    /// Previous error
    prev_error: Option<f64>,

    /// The integral accumulation
    integral: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidGains {
    /// Proportional only gains.
    pub fn p(k_p: f64) -> Self {
        Self {
            k_p,
            ..Default::default()
        }
    }

    /// Full PID gains with no limits.
    pub fn pid(k_p: f64, k_i: f64, k_d: f64) -> Self {
        Self {
            k_p,
            k_i,
            k_d,
            ..Default::default()
        }
    }

    /// True if every gain and limit is finite and the limits are positive.
    pub fn is_valid(&self) -> bool {
        let limit_ok = |l: Option<f64>| l.map(|v| v.is_finite() && v > 0.0).unwrap_or(true);

        self.k_p.is_finite()
            && self.k_i.is_finite()
            && self.k_d.is_finite()
            && limit_ok(self.i_max)
            && limit_ok(self.output_limit)
    }
}

impl PidController {
    /// Create a new controller with the given gains.
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            prev_time_ms: None,
            prev_error: None,
            integral: 0f64,
        }
    }

    /// Get the current integral accumulator.
    pub fn integral(&self) -> f64 {
        self.integral
    }
}

impl Pid for PidController {
    fn calculate(&mut self, target: f64, measurement: f64, now_ms: f64) -> f64 {
        let error = target - measurement;

        // No time difference means no integral or derivative this call,
        // otherwise we'd get a large spike compared to normal operation.
        let dt = match self.prev_time_ms {
            Some(t0) if now_ms > t0 => Some(ms_to_s(now_ms - t0)),
            _ => None,
        };

        if let Some(t) = dt {
            self.integral += error * t;
            if let Some(i_max) = self.gains.i_max {
                self.integral = clamp_abs(self.integral, i_max);
            }
        }

        let deriv = match (self.prev_error, dt) {
            (Some(e), Some(t)) => (error - e) / t,
            _ => 0f64,
        };

        let mut out = self.gains.k_p * error + self.gains.k_i * self.integral + self.gains.k_d * deriv;

        if let Some(limit) = self.gains.output_limit {
            out = clamp_abs(out, limit);
        }

        self.prev_error = Some(error);
        self.prev_time_ms = Some(now_ms);

        out
    }

    fn reset(&mut self) {
        self.integral = 0f64;
        self.prev_error = None;
        self.prev_time_ms = None;
    }
}
