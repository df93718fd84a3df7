//! Distance controller with heading hold

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;

// Internal
use super::control_loop::{MnvrCore, TickOutput};
use super::*;
use crate::hal::{Clock, DriveBase};
use crate::heading::HeadingHandle;
use crate::pid::{Pid, PidController};
use util::{archive::Archiver, maths::ang_dist_deg};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Drives the robot a set distance along the heading it starts on.
///
/// The forward command comes from the distance loop and a differential
/// correction from the heading hold loop:
///
/// ```text
/// left  = forward + correction
/// right = forward - correction
/// ```
pub struct DriveCtrl<P = PidController> {
    core: MnvrCore,

    /// Encoder ticks in, forward command out
    distance_pid: P,

    /// Degrees in, differential command out
    heading_pid: P,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DriveCtrl<PidController> {
    /// Create a new controller using the gains in the parameters.
    pub fn new(params: &MnvrParams, heading: HeadingHandle) -> Result<Self, MnvrError> {
        Self::with_pids(
            params,
            heading,
            PidController::new(params.distance_pid),
            PidController::new(params.heading_hold_pid),
        )
    }
}

impl<P: Pid> DriveCtrl<P> {
    /// Create a new controller with the given PID implementations.
    pub fn with_pids(
        params: &MnvrParams,
        heading: HeadingHandle,
        distance_pid: P,
        heading_pid: P,
    ) -> Result<Self, MnvrError> {
        Ok(Self {
            core: MnvrCore::new(params, heading)?,
            distance_pid,
            heading_pid,
        })
    }

    /// Set or clear the per-tick telemetry archive.
    pub fn set_archiver(&mut self, archiver: Option<Archiver>) {
        self.core.set_archiver(archiver);
    }

    /// Drive until the encoder is within `accuracy` ticks of `target`.
    ///
    /// The encoder is relative to the end of the last completed manoeuvre.
    /// The heading held is the one read on the first tick, so manoeuvres can
    /// be chained from whatever heading the robot is left on.
    pub fn drive_to_target<B, C>(
        &mut self,
        base: &mut B,
        clock: &C,
        target: i64,
        accuracy: f64,
        cancel: &CancelToken,
    ) -> Result<MnvrReport, MnvrError>
    where
        B: DriveBase,
        C: Clock + ?Sized,
    {
        let DriveCtrl {
            core: mnvr,
            distance_pid,
            heading_pid,
        } = self;

        distance_pid.reset();
        heading_pid.reset();

        let target_ticks = target as f64;
        let mut hold_deg: Option<f64> = None;

        mnvr.run(
            MnvrKind::Drive,
            target_ticks,
            accuracy,
            base,
            clock,
            cancel,
            |sensors| {
                let ticks = sensors.encoder_ticks()? as f64;
                let heading = sensors.heading_deg()?;
                let now_ms = sensors.now_ms();

                let hold = match hold_deg {
                    Some(h) => h,
                    None => {
                        debug!("Holding heading {:.2} deg", heading);
                        hold_deg = Some(heading);
                        heading
                    }
                };

                let forward = distance_pid.calculate(target_ticks, ticks, now_ms);

                // Measure about the held heading so crossing the wrap doesn't
                // step the error by 360
                let measured = hold + ang_dist_deg(hold, heading);
                let correction = heading_pid.calculate(hold, measured, now_ms);

                Ok(TickOutput {
                    measurement: ticks,
                    error: ticks - target_ticks,
                    left: forward + correction,
                    right: forward - correction,
                })
            },
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cmd_map::CommandMapKind;
    use crate::hal::{EncoderReading, HalError, MotorDemands};
    use crate::heading::HeadingTracker;
    use crate::pid::PidGains;
    use crate::sim::{SimClock, SimParams, SimRobot};

    fn params() -> MnvrParams {
        MnvrParams {
            cycle_period_s: 0.02,
            settle_ticks: 12,
            max_duration_s: Some(10.0),
            sensor_stale_limit_s: None,
            slew_max_accel: None,
            command_map: CommandMapKind::Linear,
            distance_pid: PidGains::p(0.5),
            heading_hold_pid: PidGains::p(4.0),
            turn_pid: PidGains::p(1.0),
        }
    }

    fn sim(ticks_per_cmd_s: f64, yaw_disturbance_dps: f64) -> SimRobot {
        SimRobot::lockstep(SimParams {
            ticks_per_cmd_s,
            dps_per_cmd: 3.0,
            yaw_disturbance_dps,
            initial_heading_deg: 0.0,
        })
    }

    /// Encoder which never produces a fresh reading.
    #[derive(Default)]
    struct FrozenBase {
        dems: Vec<MotorDemands>,
    }

    impl DriveBase for FrozenBase {
        fn encoder(&mut self) -> Result<EncoderReading, HalError> {
            Ok(EncoderReading {
                ticks: 0,
                timestamp_ms: Some(0.0),
            })
        }

        fn reset_encoder(&mut self) -> Result<(), HalError> {
            Ok(())
        }

        fn send_demands(&mut self, dems: &MotorDemands) -> Result<(), HalError> {
            self.dems.push(*dems);
            Ok(())
        }
    }

    #[test]
    fn test_drive_reaches_target() {
        let mut bot = sim(50.0, 0.0);
        let clock = bot.clone();
        let mut ctrl = DriveCtrl::new(&params(), bot.heading().unwrap()).unwrap();

        let report = ctrl
            .drive_to_target(&mut bot, &clock, 1000, 10.0, &CancelToken::new())
            .unwrap();

        assert_eq!(report.outcome, MnvrOutcome::Reached);
        assert_eq!(report.kind, MnvrKind::Drive);
        assert!(report.ticks > 13 && report.ticks < 100, "ticks = {}", report.ticks);
        assert!(report.final_error.unwrap().abs() < 10.0);

        // Encoder zeroed and motors left stopped
        assert_eq!(bot.encoder_ticks(), 0.0);
        let history = bot.demand_history();
        assert!(history.last().unwrap().is_stopped());

        // Starts flat out and never reverses
        assert_eq!(history[0], MotorDemands::sides(127, 127));
        assert!(history.iter().all(|d| d.front_left >= 0 && d.front_right >= 0));
    }

    #[test]
    fn test_drive_backwards() {
        let mut bot = sim(50.0, 0.0);
        let clock = bot.clone();
        let mut ctrl = DriveCtrl::new(&params(), bot.heading().unwrap()).unwrap();

        let report = ctrl
            .drive_to_target(&mut bot, &clock, -400, 10.0, &CancelToken::new())
            .unwrap();

        assert_eq!(report.outcome, MnvrOutcome::Reached);
        assert_eq!(bot.demand_history()[0], MotorDemands::sides(-127, -127));
    }

    #[test]
    fn test_heading_hold_rejects_disturbance() {
        let mut bot = sim(50.0, 20.0);
        let clock = bot.clone();
        let mut ctrl = DriveCtrl::new(&params(), bot.heading().unwrap()).unwrap();

        let report = ctrl
            .drive_to_target(&mut bot, &clock, 1000, 10.0, &CancelToken::new())
            .unwrap();

        assert_eq!(report.outcome, MnvrOutcome::Reached);

        // Uncorrected the disturbance turns the robot by about 10 degrees over
        // the manoeuvre
        assert!(bot.true_heading_deg().abs() < 5.0, "heading = {}", bot.true_heading_deg());

        // The correction turns against the disturbance
        assert!(bot
            .demand_history()
            .iter()
            .any(|d| d.front_left < d.front_right));
    }

    #[test]
    fn test_heading_hold_across_wrap() {
        // Held heading of 179 pushed over into negative headings
        let mut bot = SimRobot::lockstep(SimParams {
            ticks_per_cmd_s: 50.0,
            dps_per_cmd: 3.0,
            yaw_disturbance_dps: 20.0,
            initial_heading_deg: 179.0,
        });
        let clock = bot.clone();
        let mut ctrl = DriveCtrl::new(&params(), bot.heading().unwrap()).unwrap();

        let report = ctrl
            .drive_to_target(&mut bot, &clock, 1000, 10.0, &CancelToken::new())
            .unwrap();

        assert_eq!(report.outcome, MnvrOutcome::Reached);

        let heading = bot.true_heading_deg();
        assert!(heading < 0.0, "heading = {}", heading);
        assert!(ang_dist_deg(179.0, heading).abs() < 5.0, "heading = {}", heading);

        // A 360 degree step in the error would saturate the correction
        assert!(
            bot.demand_history().iter().all(|d| d.front_left > -50 && d.front_right > -50),
            "{:?}",
            bot.demand_history()
        );
    }

    #[test]
    fn test_timeout_stops_without_reset() {
        let mut bot = sim(1.0, 0.0);
        let clock = bot.clone();
        let mut p = params();
        p.max_duration_s = Some(1.0);
        let mut ctrl = DriveCtrl::new(&p, bot.heading().unwrap()).unwrap();

        let report = ctrl
            .drive_to_target(&mut bot, &clock, 1000, 10.0, &CancelToken::new())
            .unwrap();

        assert_eq!(report.outcome, MnvrOutcome::TimedOut);
        assert_eq!(report.ticks, 50);
        assert!(bot.demand_history().last().unwrap().is_stopped());

        // Distance covered is kept
        assert!(bot.encoder_ticks() > 100.0);
    }

    #[test]
    fn test_cancel_before_start() {
        let mut bot = sim(50.0, 0.0);
        let clock = bot.clone();
        let mut ctrl = DriveCtrl::new(&params(), bot.heading().unwrap()).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = ctrl
            .drive_to_target(&mut bot, &clock, 1000, 10.0, &cancel)
            .unwrap();

        assert_eq!(report.outcome, MnvrOutcome::Cancelled);
        assert_eq!(report.ticks, 0);
        assert_eq!(report.final_error, None);
        assert_eq!(bot.demand_history(), vec![MotorDemands::stop()]);
    }

    #[test]
    fn test_cancel_from_other_thread() {
        let mut bot = sim(0.0, 0.0);
        let clock = bot.clone();
        let mut p = params();
        p.max_duration_s = None;
        let mut ctrl = DriveCtrl::new(&p, bot.heading().unwrap()).unwrap();

        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            remote.cancel();
        });

        let report = ctrl
            .drive_to_target(&mut bot, &clock, 1000, 10.0, &cancel)
            .unwrap();
        canceller.join().unwrap();

        assert_eq!(report.outcome, MnvrOutcome::Cancelled);
        assert!(bot.demand_history().last().unwrap().is_stopped());
    }

    #[test]
    fn test_stale_encoder() {
        let mut base = FrozenBase::default();
        let clock = SimClock::new();
        let tracker = HeadingTracker::new(0.0);
        let mut p = params();
        p.sensor_stale_limit_s = Some(0.1);
        let mut ctrl = DriveCtrl::new(&p, tracker.handle()).unwrap();

        let result = ctrl.drive_to_target(&mut base, &clock, 1000, 10.0, &CancelToken::new());

        match result {
            Err(MnvrError::SensorStale { sensor, age_s }) => {
                assert_eq!(sensor, "encoder");
                assert!(age_s > 0.1);
            }
            r => panic!("Expected a stale encoder, got {:?}", r),
        }

        // Six good ticks then the stop
        assert_eq!(base.dems.len(), 7);
        assert!(base.dems.last().unwrap().is_stopped());
    }

    #[test]
    fn test_invalid_params() {
        let mut p = params();
        p.heading_hold_pid.k_p = std::f64::INFINITY;

        let r = DriveCtrl::new(&p, HeadingTracker::new(0.0).handle());
        assert!(matches!(r, Err(MnvrError::InvalidParams(_))));
    }
}
