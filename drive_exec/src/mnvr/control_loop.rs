//! Control loop shared by the drive and turn controllers
//!
//! Each controller supplies a control law which is evaluated once per tick.
//! The loop takes care of everything else: cancellation and deadlines, output
//! shaping, the settle debounce, telemetry, and leaving the motors safe
//! whatever the outcome.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, info, trace, warn};
use std::time::Duration;

// Internal
use super::*;
use crate::cmd_map::{side_command, CommandMap};
use crate::hal::{Clock, DriveBase, MotorDemands, MOTOR_CMD_LIMIT};
use crate::heading::HeadingHandle;
use crate::slew::RateLimiter;
use util::{archive::Archiver, maths::clamp_abs, time::ms_to_s};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Output of one evaluation of a control law.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TickOutput {
    /// The measured quantity being controlled.
    pub measurement: f64,

    /// Error used for the settle check. Only its magnitude is compared to the
    /// accuracy.
    pub error: f64,

    /// Unshaped left side command.
    pub left: f64,

    /// Unshaped right side command.
    pub right: f64,
}

/// Sensor access for a single tick.
///
/// Readings older than the configured stale limit are rejected.
pub(crate) struct Sensors<'a> {
    base: &'a mut dyn DriveBase,
    heading: &'a HeadingHandle,
    stale_limit_s: Option<f64>,
    now_ms: f64,
}

/// Parts common to both controllers.
pub(crate) struct MnvrCore {
    params: MnvrParams,
    heading: HeadingHandle,
    cmd_map: Box<dyn CommandMap + Send>,
    archiver: Option<Archiver>,
}

/// Counters kept across the loop so the report can be built after an early
/// return.
#[derive(Default)]
struct Progress {
    ticks: u64,
    final_error: Option<f64>,
}

type SidePair = (RateLimiter, RateLimiter);

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<'a> Sensors<'a> {
    /// Time at the start of this tick.
    ///
    /// Units: milliseconds
    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    /// Current heading estimate.
    ///
    /// Units: degrees
    pub fn heading_deg(&self) -> Result<f64, MnvrError> {
        check_age(
            "heading",
            self.now_ms - self.heading.last_update_ms(),
            self.stale_limit_s,
        )?;

        Ok(self.heading.angle_deg())
    }

    /// Current encoder count. The age is only checked if the hardware
    /// timestamps its readings.
    ///
    /// Units: encoder ticks
    pub fn encoder_ticks(&mut self) -> Result<i64, MnvrError> {
        let reading = self.base.encoder()?;

        if let Some(t) = reading.timestamp_ms {
            check_age("encoder", self.now_ms - t, self.stale_limit_s)?;
        }

        Ok(reading.ticks)
    }
}

impl MnvrCore {
    pub fn new(params: &MnvrParams, heading: HeadingHandle) -> Result<Self, MnvrError> {
        params.validate()?;

        Ok(Self {
            params: params.clone(),
            heading,
            cmd_map: params.command_map.build(),
            archiver: None,
        })
    }

    pub fn set_archiver(&mut self, archiver: Option<Archiver>) {
        self.archiver = archiver;
    }

    /// Run a manoeuvre to completion.
    ///
    /// Blocks until the target is reached, the deadline passes, the token is
    /// cancelled or an error occurs. The motors are stopped in every case, and
    /// the encoder is zeroed as well when the target is reached.
    #[allow(clippy::too_many_arguments)]
    pub fn run<B, C, F>(
        &mut self,
        kind: MnvrKind,
        target: f64,
        accuracy: f64,
        base: &mut B,
        clock: &C,
        cancel: &CancelToken,
        mut law: F,
    ) -> Result<MnvrReport, MnvrError>
    where
        B: DriveBase,
        C: Clock + ?Sized,
        F: FnMut(&mut Sensors<'_>) -> Result<TickOutput, MnvrError>,
    {
        if !(accuracy.is_finite() && accuracy > 0.0) {
            return Err(MnvrError::InvalidAccuracy(accuracy));
        }

        info!(
            "{:?} manoeuvre started: target {:.3}, accuracy {:.3}",
            kind, target, accuracy
        );

        let start_ms = clock.now_ms();
        let mut progress = Progress::default();

        let result = self.run_loop(
            kind, target, accuracy, base, clock, cancel, &mut progress, &mut law,
        );

        let outcome = match result {
            Ok(o) => o,
            Err(e) => {
                if let Err(stop_err) = base.send_demands(&MotorDemands::stop()) {
                    error!("Could not stop the motors after a failed manoeuvre: {}", stop_err);
                }
                warn!("{:?} manoeuvre aborted after {} ticks: {}", kind, progress.ticks, e);
                return Err(e);
            }
        };

        base.send_demands(&MotorDemands::stop())?;
        if outcome == MnvrOutcome::Reached {
            base.reset_encoder()?;
        }

        let report = MnvrReport {
            kind,
            target,
            accuracy,
            outcome,
            ticks: progress.ticks,
            final_error: progress.final_error,
            elapsed_s: ms_to_s(clock.now_ms() - start_ms),
        };

        match outcome {
            MnvrOutcome::Reached => info!(
                "{:?} manoeuvre reached target in {} ticks ({:.2} s)",
                kind, report.ticks, report.elapsed_s
            ),
            MnvrOutcome::TimedOut => warn!(
                "{:?} manoeuvre timed out after {:.2} s, error {:?}",
                kind, report.elapsed_s, report.final_error
            ),
            MnvrOutcome::Cancelled => info!(
                "{:?} manoeuvre cancelled after {} ticks", kind, report.ticks
            ),
        }

        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_loop<B, C, F>(
        &mut self,
        kind: MnvrKind,
        target: f64,
        accuracy: f64,
        base: &mut B,
        clock: &C,
        cancel: &CancelToken,
        progress: &mut Progress,
        law: &mut F,
    ) -> Result<MnvrOutcome, MnvrError>
    where
        B: DriveBase,
        C: Clock + ?Sized,
        F: FnMut(&mut Sensors<'_>) -> Result<TickOutput, MnvrError>,
    {
        let period = Duration::from_secs_f64(self.params.cycle_period_s);
        let start_ms = clock.now_ms();
        let mut debounce = SettleDebounce::new(self.params.settle_ticks);

        // Both sides start from rest
        let mut slew: Option<SidePair> = match self.params.slew_max_accel {
            Some(a) => {
                let now_s = ms_to_s(start_ms);
                Some((RateLimiter::new(a, now_s)?, RateLimiter::new(a, now_s)?))
            }
            None => None,
        };

        loop {
            let cycle_start_ms = clock.now_ms();

            if cancel.is_cancelled() {
                return Ok(MnvrOutcome::Cancelled);
            }

            if let Some(max_s) = self.params.max_duration_s {
                if ms_to_s(cycle_start_ms - start_ms) >= max_s {
                    return Ok(MnvrOutcome::TimedOut);
                }
            }

            // ---- CONTROL LAW ----

            let out = {
                let mut sensors = Sensors {
                    base: &mut *base,
                    heading: &self.heading,
                    stale_limit_s: self.params.sensor_stale_limit_s,
                    now_ms: cycle_start_ms,
                };
                law(&mut sensors)?
            };

            let dems = self.shape_demands(out.left, out.right, ms_to_s(cycle_start_ms), &mut slew);
            base.send_demands(&dems)?;

            // ---- SETTLE CHECK ----

            progress.ticks += 1;
            progress.final_error = Some(out.error);

            let within = out.error.abs() < accuracy;
            let settled = debounce.update(within);
            let state = if settled {
                MnvrState::Done
            } else if within {
                MnvrState::Settling
            } else {
                MnvrState::Seeking
            };

            trace!(
                "{:?} tick {}: {:?}, measured {:.3}, error {:.3}, dems ({}, {})",
                kind,
                progress.ticks,
                state,
                out.measurement,
                out.error,
                dems.front_left,
                dems.front_right
            );

            self.archive(TickRecord {
                tick: progress.ticks,
                time_s: ms_to_s(cycle_start_ms - start_ms),
                state,
                target,
                measurement: out.measurement,
                error: out.error,
                left_cmd: out.left,
                right_cmd: out.right,
                left_dem: dems.front_left,
                right_dem: dems.front_right,
                settle_count: debounce.count(),
            });

            if settled {
                return Ok(MnvrOutcome::Reached);
            }

            // ---- CYCLE MANAGEMENT ----

            let cycle_s = ms_to_s((clock.now_ms() - cycle_start_ms).max(0.0));

            match period.checked_sub(Duration::from_secs_f64(cycle_s)) {
                Some(d) => clock.sleep(d),
                None => warn!(
                    "Manoeuvre cycle overran by {:.06} s",
                    cycle_s - self.params.cycle_period_s
                ),
            }
        }
    }

    /// Saturate, slew limit and map the side commands onto the motors.
    fn shape_demands(
        &self,
        left: f64,
        right: f64,
        now_s: f64,
        slew: &mut Option<SidePair>,
    ) -> MotorDemands {
        let limit = MOTOR_CMD_LIMIT as f64;
        let saturate = |v: f64| if v.is_finite() { clamp_abs(v, limit) } else { 0.0 };

        let (mut left, mut right) = (saturate(left), saturate(right));

        if let Some((l, r)) = slew.as_mut() {
            left = l.compute(left, now_s);
            right = r.compute(right, now_s);
        }

        MotorDemands::sides(
            side_command(left, &*self.cmd_map),
            side_command(right, &*self.cmd_map),
        )
    }

    fn archive(&mut self, record: TickRecord) {
        let failed = match self.archiver.as_mut() {
            Some(a) => a.serialise(record).err(),
            None => None,
        };

        // Telemetry is not worth aborting a manoeuvre over
        if let Some(e) = failed {
            warn!("Tick archiving disabled: {}", e);
            self.archiver = None;
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn check_age(sensor: &'static str, age_ms: f64, limit_s: Option<f64>) -> Result<(), MnvrError> {
    let age_s = ms_to_s(age_ms);

    match limit_s {
        Some(l) if age_s > l => {
            debug!("{} reading rejected, {:.3} s old (limit {:.3} s)", sensor, age_s, l);
            Err(MnvrError::SensorStale { sensor, age_s })
        }
        _ => Ok(()),
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
            max_duration_s: Some(1.0),
            sensor_stale_limit_s: None,
            slew_max_accel: None,
            command_map: CommandMapKind::Linear,
            distance_pid: PidGains::p(1.0),
            heading_hold_pid: PidGains::p(1.0),
            turn_pid: PidGains::p(1.0),
        }
    }

    fn robot() -> SimRobot {
        SimRobot::lockstep(SimParams {
            ticks_per_cmd_s: 0.0,
            dps_per_cmd: 0.0,
            yaw_disturbance_dps: 0.0,
            initial_heading_deg: 0.0,
        })
    }

    #[test]
    fn test_check_age() {
        assert!(check_age("x", 500.0, None).is_ok());
        assert!(check_age("x", 100.0, Some(0.1)).is_ok());
        match check_age("x", 250.0, Some(0.1)) {
            Err(MnvrError::SensorStale { sensor, age_s }) => {
                assert_eq!(sensor, "x");
                assert!((age_s - 0.25).abs() < 1e-12);
            }
            r => panic!("Expected stale error, got {:?}", r),
        }
    }

    #[test]
    fn test_shape_demands_saturates_and_maps() {
        let mnvr = MnvrCore::new(&params(), HeadingTracker::new(0.0).handle()).unwrap();
        let mut slew = None;

        let d = mnvr.shape_demands(300.0, -12.7, 0.0, &mut slew);
        assert_eq!(d, MotorDemands::sides(127, -12));

        let d = mnvr.shape_demands(std::f64::NAN, 5.0, 0.0, &mut slew);
        assert_eq!(d, MotorDemands::sides(0, 5));
    }

    #[test]
    fn test_shape_demands_slew_limited() {
        let mut p = params();
        p.slew_max_accel = Some(1000.0);
        let mnvr = MnvrCore::new(&p, HeadingTracker::new(0.0).handle()).unwrap();
        let mut slew = Some((
            RateLimiter::new(1000.0, 0.0).unwrap(),
            RateLimiter::new(1000.0, 0.0).unwrap(),
        ));

        // 1000/s over 20 ms is at most 20 per tick
        let d = mnvr.shape_demands(127.0, -127.0, 0.02, &mut slew);
        assert_eq!(d, MotorDemands::sides(20, -20));
        let d = mnvr.shape_demands(127.0, -127.0, 0.04, &mut slew);
        assert_eq!(d, MotorDemands::sides(40, -40));
    }

    #[test]
    fn test_settles_after_threshold_ticks() {
        let mut bot = robot();
        let clock = bot.clone();
        let mut mnvr = MnvrCore::new(&params(), bot.heading().unwrap()).unwrap();

        let report = mnvr
            .run(MnvrKind::Drive, 0.0, 1.0, &mut bot, &clock, &CancelToken::new(), |_| {
                Ok(TickOutput { measurement: 0.0, error: 0.0, left: 0.0, right: 0.0 })
            })
            .unwrap();

        assert_eq!(report.outcome, MnvrOutcome::Reached);
        assert_eq!(report.ticks, 13);
        assert_eq!(report.final_error, Some(0.0));
    }

    #[test]
    fn test_law_error_stops_motors() {
        let mut bot = robot();
        let clock = bot.clone();
        let mut mnvr = MnvrCore::new(&params(), bot.heading().unwrap()).unwrap();
        let mut calls = 0;

        let result = mnvr.run(
            MnvrKind::Turn, 0.0, 1.0, &mut bot, &clock, &CancelToken::new(),
            |_| {
                calls += 1;
                if calls > 3 {
                    Err(MnvrError::SensorStale { sensor: "heading", age_s: 1.0 })
                } else {
                    Ok(TickOutput { measurement: 0.0, error: 50.0, left: 60.0, right: -60.0 })
                }
            },
        );

        assert!(matches!(result, Err(MnvrError::SensorStale { .. })));
        let history = bot.demand_history();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0], MotorDemands::sides(60, -60));
        assert!(history[3].is_stopped());
    }

    #[test]
    fn test_invalid_accuracy() {
        let mut bot = robot();
        let clock = bot.clone();
        let mut mnvr = MnvrCore::new(&params(), bot.heading().unwrap()).unwrap();

        for acc in [0.0, -1.0, std::f64::INFINITY].iter() {
            let r = mnvr.run(MnvrKind::Drive, 0.0, *acc, &mut bot, &clock, &CancelToken::new(), |_| {
                Ok(TickOutput { measurement: 0.0, error: 0.0, left: 0.0, right: 0.0 })
            });
            assert!(matches!(r, Err(MnvrError::InvalidAccuracy(_))));
        }
        assert!(bot.demand_history().is_empty());
    }
}
