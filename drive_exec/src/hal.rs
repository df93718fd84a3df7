//! # Hardware abstraction layer
//!
//! The motion controllers only ever touch the robot through the traits in
//! this module: a monotonic clock, a yaw rate gyro and the drive base (one
//! resettable distance encoder plus four motor channels).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Largest magnitude accepted by a motor channel.
pub const MOTOR_CMD_LIMIT: i32 = 127;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A monotonic time source which can also suspend the caller.
pub trait Clock {
    /// Current time in milliseconds since an arbitrary fixed epoch.
    fn now_ms(&self) -> f64;

    /// Suspend the caller for the given duration.
    fn sleep(&self, duration: Duration);
}

/// A single axis yaw rate gyroscope.
pub trait RateGyro {
    /// Read the current angular rate.
    ///
    /// Units: degrees/second, positive when the heading is increasing.
    fn rate_dps(&mut self) -> Result<f64, HalError>;
}

/// A differential drive base with a single distance encoder.
pub trait DriveBase {
    /// Read the distance encoder.
    fn encoder(&mut self) -> Result<EncoderReading, HalError>;

    /// Zero the distance encoder.
    fn reset_encoder(&mut self) -> Result<(), HalError>;

    /// Write all four motor channels.
    fn send_demands(&mut self, dems: &MotorDemands) -> Result<(), HalError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A reading from the distance encoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderReading {
    /// Accumulated count since the last reset.
    ///
    /// Units: encoder ticks
    pub ticks: i64,

    /// Time at which the count was acquired, if the hardware provides one.
    ///
    /// Units: milliseconds, same epoch as the `Clock` in use.
    pub timestamp_ms: Option<f64>,
}

/// Demands for the four drive motors.
///
/// Every channel is in [-127, 127].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MotorDemands {
    pub front_left: i32,
    pub rear_left: i32,
    pub front_right: i32,
    pub rear_right: i32,
}

/// `Clock` backed by the system's monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    epoch: Instant,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by hardware access.
#[derive(Debug, thiserror::Error)]
pub enum HalError {
    #[error("Could not read from the device: {0}")]
    Read(String),

    #[error("Could not write to the device: {0}")]
    Write(String),

    #[error("The device is disconnected")]
    Disconnected,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MotorDemands {
    /// All motors stopped.
    pub fn stop() -> Self {
        Self::default()
    }

    /// Apply one value to both motors on each side, saturating each to the
    /// channel limit.
    pub fn sides(left: i32, right: i32) -> Self {
        let left = left.clamp(-MOTOR_CMD_LIMIT, MOTOR_CMD_LIMIT);
        let right = right.clamp(-MOTOR_CMD_LIMIT, MOTOR_CMD_LIMIT);

        Self {
            front_left: left,
            rear_left: left,
            front_right: right,
            rear_right: right,
        }
    }

    /// True if every channel is zero.
    pub fn is_stopped(&self) -> bool {
        *self == Self::stop()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration)
    }
}
