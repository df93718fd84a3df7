//! # Manoeuvre script module
//!
//! A script is a TOML file holding an ordered list of manoeuvres, executed
//! one after the other:
//!
//! ```toml
//! [[mnvr]]
//! type = "drive"
//! target = 1000
//! accuracy = 10
//!
//! [[mnvr]]
//! type = "turn"
//! target = 90.0
//! accuracy = 2.0
//! ```
//!
//! Drive targets and accuracies are in encoder ticks, turns are in degrees.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// Internal
use util::params::{self, LoadError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A validated manoeuvre script.
#[derive(Debug, Clone)]
pub struct MnvrScript {
    cmds: Vec<MnvrCmd>,
}

#[derive(Deserialize)]
struct ScriptFile {
    #[serde(default)]
    mnvr: Vec<MnvrCmd>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A single scripted manoeuvre.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MnvrCmd {
    Drive { target: i64, accuracy: f64 },
    Turn { target: f64, accuracy: f64 },
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0}")]
    ScriptNotFound(String),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(LoadError),

    #[error("The script contains no manoeuvres")]
    ScriptEmpty,

    #[error("Manoeuvre {index} has an invalid accuracy ({accuracy}), it must be positive")]
    InvalidAccuracy { index: usize, accuracy: f64 },

    #[error("Manoeuvre {index} has a non-finite target")]
    InvalidTarget { index: usize },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MnvrScript {
    /// Load and validate a script file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScriptError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScriptError::ScriptNotFound(path.display().to_string()));
        }

        let file: ScriptFile =
            params::load_from_path(path).map_err(ScriptError::ScriptLoadError)?;

        Self::from_cmds(file.mnvr)
    }

    /// Parse and validate a script held in a string.
    pub fn parse(script: &str) -> Result<Self, ScriptError> {
        let file: ScriptFile = params::from_str(script).map_err(ScriptError::ScriptLoadError)?;

        Self::from_cmds(file.mnvr)
    }

    fn from_cmds(cmds: Vec<MnvrCmd>) -> Result<Self, ScriptError> {
        if cmds.is_empty() {
            return Err(ScriptError::ScriptEmpty);
        }

        for (index, cmd) in cmds.iter().enumerate() {
            let (target_ok, accuracy) = match *cmd {
                MnvrCmd::Drive { accuracy, .. } => (true, accuracy),
                MnvrCmd::Turn { target, accuracy } => (target.is_finite(), accuracy),
            };

            if !target_ok {
                return Err(ScriptError::InvalidTarget { index });
            }
            if !(accuracy.is_finite() && accuracy > 0.0) {
                return Err(ScriptError::InvalidAccuracy { index, accuracy });
            }
        }

        Ok(Self { cmds })
    }

    /// The manoeuvres in execution order.
    pub fn cmds(&self) -> &[MnvrCmd] {
        &self.cmds
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mnvr::{CancelToken, DriveCtrl, MnvrOutcome, MnvrParams, TurnCtrl};
    use crate::sim::{SimParams, SimRobot};
    use util::maths::ang_dist_deg;

    #[test]
    fn test_parse_script() {
        let script = MnvrScript::parse(
            r#"
            [[mnvr]]
            type = "drive"
            target = 1000
            accuracy = 10

            [[mnvr]]
            type = "turn"
            target = -170
            accuracy = 2.5
            "#,
        )
        .unwrap();

        assert_eq!(
            script.cmds(),
            &[
                MnvrCmd::Drive { target: 1000, accuracy: 10.0 },
                MnvrCmd::Turn { target: -170.0, accuracy: 2.5 },
            ]
        );
    }

    #[test]
    fn test_invalid_scripts() {
        assert!(matches!(MnvrScript::parse(""), Err(ScriptError::ScriptEmpty)));

        assert!(matches!(
            MnvrScript::parse("[[mnvr]]\ntype = \"strafe\"\ntarget = 1\naccuracy = 1\n"),
            Err(ScriptError::ScriptLoadError(_))
        ));

        assert!(matches!(
            MnvrScript::parse(
                "[[mnvr]]\ntype = \"turn\"\ntarget = 1\naccuracy = 1\n\
                 [[mnvr]]\ntype = \"drive\"\ntarget = 1\naccuracy = 0\n"
            ),
            Err(ScriptError::InvalidAccuracy { index: 1, .. })
        ));

        assert!(matches!(
            MnvrScript::from_cmds(vec![MnvrCmd::Turn { target: std::f64::NAN, accuracy: 1.0 }]),
            Err(ScriptError::InvalidTarget { index: 0 })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            MnvrScript::load("/definitely/not/a/script.toml"),
            Err(ScriptError::ScriptNotFound(_))
        ));
    }

    /// Run a script in lockstep with the shipped parameters, returning the
    /// outcome and final true heading of each manoeuvre.
    fn run_shipped(name: &str) -> Vec<(MnvrCmd, MnvrOutcome, f64)> {
        let root = concat!(env!("CARGO_MANIFEST_DIR"), "/..");
        let script = MnvrScript::load(format!("{}/scripts/{}", root, name)).unwrap();
        let mnvr_params: MnvrParams =
            params::load_from_path(format!("{}/params/drive_exec.toml", root)).unwrap();
        let sim_params: SimParams =
            params::load_from_path(format!("{}/params/sim_robot.toml", root)).unwrap();

        let mut robot = SimRobot::lockstep(sim_params);
        let clock = robot.clone();
        let heading = robot.heading().unwrap();
        let mut drive_ctrl = DriveCtrl::new(&mnvr_params, heading.clone()).unwrap();
        let mut turn_ctrl = TurnCtrl::new(&mnvr_params, heading).unwrap();
        let cancel = CancelToken::new();

        script
            .cmds()
            .iter()
            .map(|cmd| {
                let report = match *cmd {
                    MnvrCmd::Drive { target, accuracy } => drive_ctrl
                        .drive_to_target(&mut robot, &clock, target, accuracy, &cancel),
                    MnvrCmd::Turn { target, accuracy } => turn_ctrl
                        .turn_to_target(&mut robot, &clock, target, accuracy, &cancel),
                }
                .unwrap();
                (*cmd, report.outcome, robot.true_heading_deg())
            })
            .collect()
    }

    #[test]
    fn test_shipped_square_completes() {
        let results = run_shipped("square.toml");
        assert_eq!(results.len(), 8);

        for (cmd, outcome, heading) in results {
            assert_eq!(outcome, MnvrOutcome::Reached, "{:?}", cmd);

            if let MnvrCmd::Turn { target, accuracy } = cmd {
                assert!(
                    ang_dist_deg(heading, target).abs() < accuracy + 0.1,
                    "{:?} ended at {}",
                    cmd,
                    heading
                );
            }
        }
    }

    #[test]
    fn test_shipped_wrap_turns_complete() {
        let results = run_shipped("wrap_turn.toml");
        assert_eq!(results[1].0, MnvrCmd::Turn { target: -170.0, accuracy: 2.0 });

        for (cmd, outcome, heading) in results {
            assert_eq!(outcome, MnvrOutcome::Reached, "{:?}", cmd);

            if let MnvrCmd::Turn { target, accuracy } = cmd {
                assert!(ang_dist_deg(heading, target).abs() < accuracy + 0.1);
            }
        }
    }
}
