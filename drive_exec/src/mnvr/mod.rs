//! # Manoeuvre module
//!
//! Closed loop manoeuvres for a differential drive robot. `DriveCtrl` drives
//! a distance measured by the encoder while holding the heading it started
//! on, and `TurnCtrl` rotates on the spot to an absolute heading.
//!
//! Both controllers run the same blocking loop, one tick per cycle period:
//!
//!  1. Stop if cancelled or past the deadline.
//!  1. Evaluate the control law to get a command for each side.
//!  1. Saturate, slew limit and linearise the side commands, then send them
//!     to both motors on each side.
//!  1. Check the error against the accuracy. The manoeuvre is `Done` once the
//!     error has stayed within tolerance for more than `settle_ticks`
//!     consecutive ticks.
//!
//! Only one manoeuvre may run against a drive base at any time. The heading
//! is only ever read, through a `HeadingHandle`.
//!
//! Units are encoder ticks for drives and degrees for turns.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod control_loop;
mod drive_ctrl;
pub mod params;
mod state;
mod turn_ctrl;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use drive_ctrl::*;
pub use params::MnvrParams;
pub use state::*;
pub use turn_ctrl::*;
