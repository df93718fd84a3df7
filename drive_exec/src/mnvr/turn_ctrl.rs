//! Turn on the spot to an absolute heading

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
use super::control_loop::{MnvrCore, TickOutput};
use super::*;
use crate::hal::{Clock, DriveBase};
use crate::heading::HeadingHandle;
use crate::pid::{Pid, PidController};
use util::{
    archive::Archiver,
    maths::{ang_dist_deg, wrap_deg_180},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Rotates the robot on the spot using heading feedback only.
///
/// The drive from the turn loop is applied with opposite signs to each side,
/// left getting `+drive` and right `-drive`, so a positive drive increases
/// the heading.
pub struct TurnCtrl<P = PidController> {
    core: MnvrCore,
    pid: P,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TurnCtrl<PidController> {
    /// Create a new controller using the gains in the parameters.
    pub fn new(params: &MnvrParams, heading: HeadingHandle) -> Result<Self, MnvrError> {
        Self::with_pid(params, heading, PidController::new(params.turn_pid))
    }
}

impl<P: Pid> TurnCtrl<P> {
    pub fn with_pid(params: &MnvrParams, heading: HeadingHandle, pid: P) -> Result<Self, MnvrError> {
        Ok(Self {
            core: MnvrCore::new(params, heading)?,
            pid,
        })
    }

    /// Set or clear the per-tick telemetry archive.
    pub fn set_archiver(&mut self, archiver: Option<Archiver>) {
        self.core.set_archiver(archiver);
    }

    /// Turn until the heading is within `accuracy_deg` of `target_deg`.
    ///
    /// The target may be given in any range, it is wrapped into (-180, 180]
    /// first. The robot always turns the short way round.
    pub fn turn_to_target<B, C>(
        &mut self,
        base: &mut B,
        clock: &C,
        target_deg: f64,
        accuracy_deg: f64,
        cancel: &CancelToken,
    ) -> Result<MnvrReport, MnvrError>
    where
        B: DriveBase,
        C: Clock + ?Sized,
    {
        if !target_deg.is_finite() {
            return Err(MnvrError::InvalidTarget(target_deg));
        }
        let target = wrap_deg_180(target_deg);

        let TurnCtrl { core: mnvr, pid } = self;
        pid.reset();

        mnvr.run(
            MnvrKind::Turn,
            target,
            accuracy_deg,
            base,
            clock,
            cancel,
            |sensors| {
                let heading = sensors.heading_deg()?;
                let mut drive = pid.calculate(target, heading, sensors.now_ms());

                // Across the wrap the plain difference is the long way round
                if (heading - target).abs() > 180.0 {
                    drive = -drive;
                }

                Ok(TickOutput {
                    measurement: heading,
                    error: ang_dist_deg(heading, target),
                    left: drive,
                    right: -drive,
                })
            },
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cmd_map::CommandMapKind;
    use crate::heading::HeadingTracker;
    use crate::pid::PidGains;
    use crate::sim::{SimParams, SimRobot};

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

    fn sim(initial_heading_deg: f64) -> SimRobot {
        SimRobot::lockstep(SimParams {
            ticks_per_cmd_s: 50.0,
            dps_per_cmd: 3.0,
            yaw_disturbance_dps: 0.0,
            initial_heading_deg,
        })
    }

    #[test]
    fn test_turn_reaches_target() {
        let mut bot = sim(0.0);
        let clock = bot.clone();
        let mut ctrl = TurnCtrl::new(&params(), bot.heading().unwrap()).unwrap();

        let report = ctrl
            .turn_to_target(&mut bot, &clock, 90.0, 2.0, &CancelToken::new())
            .unwrap();

        assert_eq!(report.outcome, MnvrOutcome::Reached);
        assert_eq!(report.kind, MnvrKind::Turn);
        assert!((bot.true_heading_deg() - 90.0).abs() <= 2.0, "heading = {}", bot.true_heading_deg());
        assert!(bot.demand_history().last().unwrap().is_stopped());

        // Turning on the spot
        let first = bot.demand_history()[0];
        assert_eq!(first.front_left, 90);
        assert_eq!(first.front_right, -90);
        assert_eq!(bot.encoder_ticks(), 0.0);
    }

    #[test]
    fn test_turn_negative() {
        let mut bot = sim(30.0);
        let clock = bot.clone();
        let mut ctrl = TurnCtrl::new(&params(), bot.heading().unwrap()).unwrap();

        let report = ctrl
            .turn_to_target(&mut bot, &clock, -45.0, 2.0, &CancelToken::new())
            .unwrap();

        assert_eq!(report.outcome, MnvrOutcome::Reached);
        assert!((bot.true_heading_deg() + 45.0).abs() <= 2.0);
        assert!(bot.demand_history()[0].front_left < 0);
    }

    #[test]
    fn test_turn_takes_short_way_across_wrap() {
        let mut bot = sim(170.0);
        let clock = bot.clone();
        let mut ctrl = TurnCtrl::new(&params(), bot.heading().unwrap()).unwrap();

        let report = ctrl
            .turn_to_target(&mut bot, &clock, -170.0, 2.0, &CancelToken::new())
            .unwrap();

        assert_eq!(report.outcome, MnvrOutcome::Reached);
        assert!(ang_dist_deg(bot.true_heading_deg(), -170.0).abs() <= 2.0);

        // Heading increasing through 180 the whole way
        let history = bot.demand_history();
        assert!(history[0].front_left > 0);
        assert!(history[0].front_right < 0);
        assert!(history.iter().all(|d| d.front_left >= 0 && d.front_right <= 0));

        // 20 degrees, not 340
        assert!(report.ticks < 100, "ticks = {}", report.ticks);
    }

    #[test]
    fn test_target_is_wrapped() {
        let mut bot = sim(0.0);
        let clock = bot.clone();
        let mut ctrl = TurnCtrl::new(&params(), bot.heading().unwrap()).unwrap();

        let report = ctrl
            .turn_to_target(&mut bot, &clock, 450.0, 2.0, &CancelToken::new())
            .unwrap();

        assert_eq!(report.target, 90.0);
        assert!((bot.true_heading_deg() - 90.0).abs() <= 2.0);

        let r = ctrl.turn_to_target(&mut bot, &clock, std::f64::NAN, 2.0, &CancelToken::new());
        assert!(matches!(r, Err(MnvrError::InvalidTarget(_))));
    }

    #[test]
    fn test_already_on_target() {
        let mut bot = sim(45.0);
        let clock = bot.clone();
        let mut ctrl = TurnCtrl::new(&params(), bot.heading().unwrap()).unwrap();

        let report = ctrl
            .turn_to_target(&mut bot, &clock, 45.0, 1.0, &CancelToken::new())
            .unwrap();

        // Still has to settle
        assert_eq!(report.ticks, 13);
        assert_eq!(report.outcome, MnvrOutcome::Reached);
    }

    #[test]
    fn test_stale_heading() {
        let mut bot = sim(0.0);
        let clock = bot.clone();
        let frozen = HeadingTracker::new(0.0);
        let mut p = params();
        p.sensor_stale_limit_s = Some(0.1);
        let mut ctrl = TurnCtrl::new(&p, frozen.handle()).unwrap();

        let r = ctrl.turn_to_target(&mut bot, &clock, 90.0, 2.0, &CancelToken::new());

        match r {
            Err(MnvrError::SensorStale { sensor, .. }) => assert_eq!(sensor, "heading"),
            r => panic!("Expected a stale heading, got {:?}", r),
        }
        assert!(bot.demand_history().last().unwrap().is_stopped());
    }

    #[test]
    fn test_timeout() {
        let mut bot = SimRobot::lockstep(SimParams {
            ticks_per_cmd_s: 0.0,
            dps_per_cmd: 0.0,
            yaw_disturbance_dps: 0.0,
            initial_heading_deg: 0.0,
        });
        let clock = bot.clone();
        let mut p = params();
        p.max_duration_s = Some(0.5);
        let mut ctrl = TurnCtrl::new(&p, bot.heading().unwrap()).unwrap();

        let report = ctrl
            .turn_to_target(&mut bot, &clock, 90.0, 2.0, &CancelToken::new())
            .unwrap();

        assert_eq!(report.outcome, MnvrOutcome::TimedOut);
        assert_eq!(report.ticks, 25);
        assert_eq!(report.final_error, Some(90.0));
        assert!(bot.demand_history().last().unwrap().is_stopped());
    }
}
