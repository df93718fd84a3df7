//! Manoeuvre state, outcome and error types

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

// Internal
use crate::hal::HalError;
use crate::slew::SlewError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Summary of a finished manoeuvre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MnvrReport {
    pub kind: MnvrKind,

    /// Requested target, encoder ticks for a drive or degrees for a turn.
    pub target: f64,

    /// Requested tolerance, in the same units as the target.
    pub accuracy: f64,

    pub outcome: MnvrOutcome,

    /// Number of control ticks executed.
    pub ticks: u64,

    /// Error on the last executed tick, or `None` if no tick ran.
    pub final_error: Option<f64>,

    /// Units: seconds
    pub elapsed_s: f64,
}

/// Telemetry for one control tick, written to the tick archive.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TickRecord {
    pub tick: u64,
    pub time_s: f64,
    pub state: MnvrState,
    pub target: f64,
    pub measurement: f64,
    pub error: f64,
    pub left_cmd: f64,
    pub right_cmd: f64,
    pub left_dem: i32,
    pub right_dem: i32,
    pub settle_count: u32,
}

/// Counts consecutive within-tolerance ticks.
///
/// Completion requires strictly more than `threshold` consecutive good ticks,
/// and a single bad tick starts the count again.
#[derive(Debug, Clone, Copy)]
pub struct SettleDebounce {
    threshold: u32,
    count: u32,
}

/// A flag used to abort a running manoeuvre from another thread.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MnvrKind {
    Drive,
    Turn,
}

/// Control state of a running manoeuvre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MnvrState {
    /// Error is outside the tolerance.
    Seeking,

    /// Error is within the tolerance but not yet for long enough.
    Settling,

    /// The target has been reached.
    Done,
}

/// How a manoeuvre ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MnvrOutcome {
    Reached,
    TimedOut,
    Cancelled,
}

/// Errors which abort a manoeuvre.
#[derive(Debug, thiserror::Error)]
pub enum MnvrError {
    #[error("Hardware error: {0}")]
    Hardware(#[from] HalError),

    #[error("The {sensor} reading is {age_s:.3} s old")]
    SensorStale { sensor: &'static str, age_s: f64 },

    #[error("Accuracy must be positive and finite, got {0}")]
    InvalidAccuracy(f64),

    #[error("Invalid target: {0}")]
    InvalidTarget(f64),

    #[error("Invalid manoeuvre parameters: {0}")]
    InvalidParams(String),

    #[error("Could not initialise the slew limiter: {0}")]
    Slew(#[from] SlewError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SettleDebounce {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            count: 0,
        }
    }

    /// Record one tick, returning true once the target is settled.
    pub fn update(&mut self, within_tolerance: bool) -> bool {
        if within_tolerance {
            self.count = self.count.saturating_add(1);
        } else {
            self.count = 0;
        }

        self.count > self.threshold
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the manoeuvre stops at the start of its next tick.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
