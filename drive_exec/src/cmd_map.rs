//! # Motor command mapping
//!
//! Motor output is not linear in the commanded value: there's a dead band at
//! low demands and the response flattens out towards the top of the range.
//! A `CommandMap` converts a desired output magnitude into the command which
//! actually produces it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use crate::hal::MOTOR_CMD_LIMIT;
use util::maths::clamp_abs;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Linearising table, indexed by desired output magnitude.
const TRUE_SPEED: [u8; 128] = [
      0,   0,   0,   0,   0,   0,   0,   0,   0,   0,
      0,  21,  21,  21,  22,  22,  22,  23,  24,  24,
     25,  25,  25,  25,  26,  27,  27,  28,  28,  28,
     28,  29,  30,  30,  30,  31,  31,  32,  32,  32,
     33,  33,  34,  34,  35,  35,  35,  36,  36,  37,
     37,  37,  37,  38,  38,  39,  39,  39,  40,  40,
     41,  41,  42,  42,  43,  44,  44,  45,  45,  46,
     46,  47,  47,  48,  48,  49,  50,  50,  51,  52,
     52,  53,  54,  55,  56,  57,  57,  58,  59,  60,
     61,  62,  63,  64,  65,  66,  67,  67,  68,  70,
     71,  72,  72,  73,  74,  76,  77,  78,  79,  79,
     80,  81,  83,  84,  84,  86,  86,  87,  87,  88,
     88,  89,  89,  90,  90, 127, 127, 127
];

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Converts a desired output magnitude into a motor command magnitude.
pub trait CommandMap {
    /// Map a magnitude in [0, 127] to a command in [0, 127].
    fn map(&self, magnitude: u8) -> i32;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Table based linearisation of the drive motors.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueSpeed;

/// Identity mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct Linear;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Selects which map to use from a parameter file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandMapKind {
    TrueSpeed,
    Linear,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CommandMap for TrueSpeed {
    fn map(&self, magnitude: u8) -> i32 {
        TRUE_SPEED[(magnitude as usize).min(TRUE_SPEED.len() - 1)] as i32
    }
}

impl CommandMap for Linear {
    fn map(&self, magnitude: u8) -> i32 {
        (magnitude as i32).min(MOTOR_CMD_LIMIT)
    }
}

impl CommandMapKind {
    /// Build the selected map.
    pub fn build(self) -> Box<dyn CommandMap + Send> {
        match self {
            CommandMapKind::TrueSpeed => Box::new(TrueSpeed),
            CommandMapKind::Linear => Box::new(Linear),
        }
    }
}

impl Default for CommandMapKind {
    fn default() -> Self {
        CommandMapKind::TrueSpeed
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert a signed side demand into a signed motor command.
///
/// The magnitude is saturated at 127 and truncated towards zero before the
/// lookup, the sign is re-applied afterwards (zero counts as positive).
pub fn side_command(value: f64, map: &dyn CommandMap) -> i32 {
    if !value.is_finite() {
        return 0;
    }

    let sign = if value >= 0.0 { 1 } else { -1 };
    let magnitude = clamp_abs(value, MOTOR_CMD_LIMIT as f64).abs() as u8;

    sign * map.map(magnitude)
}
