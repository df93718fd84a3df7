//! # Slew rate limiter
//!
//! Bounds how quickly a commanded value may change, independent of direction,
//! so the drive never sees a step demand.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Acceleration limiter for one actuated channel.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Last output value
    last_rate: f64,

    /// Time of the last output.
    ///
    /// Units: seconds
    last_time_s: f64,

    /// Maximum rate of change of the output.
    ///
    /// Units: output units/second
    max_accel: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum SlewError {
    #[error("Maximum acceleration must be positive and finite, got {0}")]
    InvalidMaxAccel(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RateLimiter {
    /// Create a new limiter with a zero baseline at `now_s`.
    pub fn new(max_accel: f64, now_s: f64) -> Result<Self, SlewError> {
        if !(max_accel.is_finite() && max_accel > 0.0) {
            return Err(SlewError::InvalidMaxAccel(max_accel));
        }

        Ok(Self {
            last_rate: 0.0,
            last_time_s: now_s,
            max_accel,
        })
    }

    /// Snap back to a zero baseline at `now_s`.
    ///
    /// Use whenever the channel is known to be at rest.
    pub fn reset(&mut self, now_s: f64) {
        self.last_rate = 0.0;
        self.last_time_s = now_s;
    }

    /// Get the acceleration limited output for the desired value at `now_s`.
    ///
    /// Calls with no elapsed time return the previous output unchanged.
    pub fn compute(&mut self, desired_rate: f64, now_s: f64) -> f64 {
        let dt = now_s - self.last_time_s;

        if dt <= 0.0 {
            return self.last_rate;
        }

        let desired_accel = (desired_rate - self.last_rate) / dt;

        let new_rate = if desired_accel.abs() <= self.max_accel {
            // Full step
            desired_rate
        }
        else {
            trace!(
                "Slew limited: wanted {:.3}/s, limited to {:.3}/s",
                desired_accel,
                self.max_accel
            );
            self.last_rate + desired_accel.signum() * self.max_accel * dt
        };

        self.last_time_s += dt;
        self.last_rate = new_rate;

        new_rate
    }

    pub fn last_rate(&self) -> f64 {
        self.last_rate
    }

    pub fn max_accel(&self) -> f64 {
        self.max_accel
    }
}
