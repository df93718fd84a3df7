//! # Drive library.
//!
//! Closed loop drive and turn manoeuvres for a differential drive robot, and
//! the pieces they are built from. The executable in this crate runs scripted
//! manoeuvres against the simulated robot.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Command mapping - linearises motor demands
pub mod cmd_map;

/// Hardware abstraction - clock, gyro and drive base traits
pub mod hal;

/// Heading - integrates the gyro into an absolute heading
pub mod heading;

/// Manoeuvre control - drive a distance or turn to a heading
pub mod mnvr;

/// PID - feedback evaluation used by the manoeuvre controllers
pub mod pid;

/// Manoeuvre scripts - ordered lists of manoeuvres loaded from file
pub mod script;

/// Simulation - a kinematic drive base for running without hardware
pub mod sim;

/// Slew limiting - bounds the rate of change of a demand
pub mod slew;
