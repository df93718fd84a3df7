//! # Heading module
//!
//! Keeps an estimate of the robot's absolute heading by integrating the yaw
//! rate gyro, normalised into (-180, 180] degrees.
//!
//! The `HeadingTracker` is the only writer. Everything else reads the heading
//! through a `HeadingHandle`, which can be cloned freely and shared with other
//! threads. On hardware the tracker is driven by a `HeadingTask` running in
//! the background at a fixed period.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod state;
mod task;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use state::*;
pub use task::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Nominal update period of the heading tracker.
pub const DEFAULT_PERIOD_S: f64 = 0.02;
