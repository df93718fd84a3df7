//! Heading tracker state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// Internal
use util::{maths::wrap_deg_180, time::ms_to_s};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Integrates yaw rate into an absolute heading.
#[derive(Debug)]
pub struct HeadingTracker {
    /// Current heading.
    ///
    /// Units: degrees, in (-180, 180]
    angle_deg: f64,

    /// Time of the last integrated sample.
    ///
    /// Units: milliseconds
    last_sample_time_ms: f64,

    /// Published copy of the state for readers
    shared: Arc<Shared>,
}

/// Read only view of a `HeadingTracker`'s output.
#[derive(Debug, Clone)]
pub struct HeadingHandle {
    shared: Arc<Shared>,
}

/// The published state. Each field is written with a single atomic store of
/// the `f64`'s bits so readers can never see a partially written value.
#[derive(Debug)]
struct Shared {
    angle_bits: AtomicU64,
    time_bits: AtomicU64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl HeadingTracker {
    /// Create a new tracker with a zero heading at `now_ms`.
    pub fn new(now_ms: f64) -> Self {
        Self::with_angle(0.0, now_ms)
    }

    /// Create a new tracker starting at the given heading.
    pub fn with_angle(angle_deg: f64, now_ms: f64) -> Self {
        let angle_deg = wrap_deg_180(angle_deg);

        Self {
            angle_deg,
            last_sample_time_ms: now_ms,
            shared: Arc::new(Shared {
                angle_bits: AtomicU64::new(angle_deg.to_bits()),
                time_bits: AtomicU64::new(now_ms.to_bits()),
            }),
        }
    }

    /// Get a read only handle onto this tracker's output.
    pub fn handle(&self) -> HeadingHandle {
        HeadingHandle {
            shared: self.shared.clone(),
        }
    }

    /// Integrate one rate sample taken at `now_ms` and return the new heading.
    ///
    /// Samples which aren't newer than the previous one, or which have a
    /// non-finite rate, are ignored.
    pub fn update(&mut self, now_ms: f64, rate_dps: f64) -> f64 {
        let dt_s = ms_to_s(now_ms - self.last_sample_time_ms);

        if !(dt_s > 0.0 && rate_dps.is_finite()) {
            return self.angle_deg;
        }

        self.angle_deg = wrap_deg_180(self.angle_deg + rate_dps * dt_s);
        self.last_sample_time_ms = now_ms;

        trace!(
            "Heading {:.3} deg (rate {:.3} deg/s over {:.4} s)",
            self.angle_deg,
            rate_dps,
            dt_s
        );

        self.publish();

        self.angle_deg
    }

    /// Recalibrate the heading to zero at `now_ms`.
    pub fn zero(&mut self, now_ms: f64) {
        self.angle_deg = 0.0;
        self.last_sample_time_ms = now_ms;
        self.publish();
    }

    pub fn angle_deg(&self) -> f64 {
        self.angle_deg
    }

    pub fn last_sample_time_ms(&self) -> f64 {
        self.last_sample_time_ms
    }

    fn publish(&self) {
        self.shared
            .angle_bits
            .store(self.angle_deg.to_bits(), Ordering::Release);
        self.shared
            .time_bits
            .store(self.last_sample_time_ms.to_bits(), Ordering::Release);
    }
}

impl HeadingHandle {
    /// Current heading in degrees, in (-180, 180].
    pub fn angle_deg(&self) -> f64 {
        f64::from_bits(self.shared.angle_bits.load(Ordering::Acquire))
    }

    /// Time at which the heading was last updated, in milliseconds.
    pub fn last_update_ms(&self) -> f64 {
        f64::from_bits(self.shared.time_bits.load(Ordering::Acquire))
    }
}
