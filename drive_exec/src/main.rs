//! Drive executable entry point.
//!
//! # Architecture
//!
//! The executable runs a manoeuvre script against the simulated drive base:
//!
//!     - Initialise the session, logging and parameters
//!     - Build the simulated robot and the heading source:
//!         - Lockstep (default): the robot tracks its own heading and time
//!           only moves on when the controllers sleep
//!         - Realtime: the robot follows the system clock and a background
//!           `HeadingTask` integrates its gyro
//!     - Execute each manoeuvre in turn, archiving per-tick telemetry and
//!       saving a report for each one
//!
//! The script stops at the first manoeuvre which doesn't reach its target.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;
use structopt::StructOpt;

// Internal
use drive_lib::{
    hal::{Clock, SystemClock},
    heading::{HeadingTask, HeadingTracker, DEFAULT_PERIOD_S},
    mnvr::{CancelToken, DriveCtrl, MnvrOutcome, MnvrParams, TurnCtrl},
    script::{MnvrCmd, MnvrScript},
    sim::{SimParams, SimRobot},
};
use util::{
    archive::Archiver,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "drive_exec", about = "Run scripted drive manoeuvres")]
struct Opts {
    /// Path to the manoeuvre script
    #[structopt(parse(from_os_str))]
    script: PathBuf,

    /// Run the simulation against the system clock rather than in lockstep
    #[structopt(long)]
    realtime: bool,

    /// Log every control tick
    #[structopt(long)]
    trace: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("drive_exec", "sessions")
        .wrap_err("Failed to create the session")?;

    // Initialise logger
    let cycle_level = if opts.trace {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    logger_init(LevelFilter::Trace, cycle_level, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Drive Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let mnvr_params: MnvrParams = util::params::load("drive_exec.toml")
        .wrap_err("Could not load manoeuvre params")?;
    let sim_params: SimParams = util::params::load("sim_robot.toml")
        .wrap_err("Could not load simulation params")?;

    info!("Exec parameters loaded");

    info!("Loading script from {:?}", opts.script);
    let script = MnvrScript::load(&opts.script).wrap_err("Failed to load script")?;
    info!("Loaded script contains {} manoeuvres\n", script.cmds().len());

    // ---- INITIALISE ROBOT ----

    let initial_heading_deg = sim_params.initial_heading_deg;

    let (mut robot, heading_task) = if opts.realtime {
        let clock = SystemClock::new();
        let robot = SimRobot::realtime(sim_params, clock);
        let tracker = HeadingTracker::with_angle(initial_heading_deg, clock.now_ms());
        let task = HeadingTask::spawn(
            tracker,
            robot.clone(),
            clock,
            Duration::from_secs_f64(DEFAULT_PERIOD_S),
        );

        info!("Running in realtime");
        (robot, Some(task))
    } else {
        info!("Running in lockstep");
        (SimRobot::lockstep(sim_params), None)
    };

    let heading = match heading_task {
        Some(ref t) => t.heading(),
        None => robot
            .heading()
            .ok_or_else(|| eyre!("The lockstep robot has no heading tracker"))?,
    };

    let clock = robot.clone();

    let mut drive_ctrl = DriveCtrl::new(&mnvr_params, heading.clone())
        .wrap_err("Failed to initialise the drive controller")?;
    let mut turn_ctrl = TurnCtrl::new(&mnvr_params, heading.clone())
        .wrap_err("Failed to initialise the turn controller")?;

    let cancel = CancelToken::new();

    info!("Initialisation complete\n");

    // ---- EXECUTE SCRIPT ----

    for (i, cmd) in script.cmds().iter().enumerate() {
        info!("Manoeuvre {}: {:?}", i, cmd);

        let archiver = match Archiver::from_path(&session, format!("mnvr_{:03}.csv", i)) {
            Ok(a) => Some(a),
            Err(e) => {
                warn!("Tick telemetry will not be archived: {}", e);
                None
            }
        };

        let result = match *cmd {
            MnvrCmd::Drive { target, accuracy } => {
                drive_ctrl.set_archiver(archiver);
                drive_ctrl.drive_to_target(&mut robot, &clock, target, accuracy, &cancel)
            }
            MnvrCmd::Turn { target, accuracy } => {
                turn_ctrl.set_archiver(archiver);
                turn_ctrl.turn_to_target(&mut robot, &clock, target, accuracy, &cancel)
            }
        };
        let report = result.wrap_err_with(|| format!("Manoeuvre {} failed", i))?;

        session.save(format!("reports/mnvr_{:03}.json", i), report);

        info!(
            "Heading now {:.2} deg (true {:.2} deg), encoder {:.0} ticks\n",
            heading.angle_deg(),
            robot.true_heading_deg(),
            robot.encoder_ticks()
        );

        if report.outcome != MnvrOutcome::Reached {
            warn!(
                "Manoeuvre {} ended {:?}, the rest of the script is skipped",
                i, report.outcome
            );
            break;
        }
    }

    // ---- SHUTDOWN ----

    info!("End of script");

    if let Some(task) = heading_task {
        task.stop();
    }

    session.exit();

    Ok(())
}
