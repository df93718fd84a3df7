//! Background heading update task

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

// Internal
use super::{HeadingHandle, HeadingTracker};
use crate::hal::{Clock, RateGyro};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Runs a `HeadingTracker` on its own thread, sampling the gyro once per
/// period until stopped.
pub struct HeadingTask {
    heading: HeadingHandle,
    stop: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<HeadingTracker>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl HeadingTask {
    /// Start the background task.
    ///
    /// A failed gyro read skips that sample, the next good sample is then
    /// integrated over the whole gap.
    pub fn spawn<G, C>(
        mut tracker: HeadingTracker,
        mut gyro: G,
        clock: C,
        period: Duration,
    ) -> Self
    where
        G: RateGyro + Send + 'static,
        C: Clock + Send + 'static,
    {
        let heading = tracker.handle();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        let join_handle = thread::spawn(move || {
            let mut consec_errors: u64 = 0;

            while !thread_stop.load(Ordering::Relaxed) {
                match gyro.rate_dps() {
                    Ok(rate_dps) => {
                        if consec_errors > 0 {
                            info!("Gyro recovered after {} failed reads", consec_errors);
                            consec_errors = 0;
                        }
                        tracker.update(clock.now_ms(), rate_dps);
                    }
                    Err(e) => {
                        if consec_errors == 0 {
                            warn!("Could not read the gyro, heading not updated: {}", e);
                        }
                        consec_errors += 1;
                    }
                }

                clock.sleep(period);
            }

            tracker
        });

        info!("Heading task started, period {:.3} s", period.as_secs_f64());

        Self {
            heading,
            stop,
            join_handle: Some(join_handle),
        }
    }

    /// Get a handle onto the tracked heading.
    pub fn heading(&self) -> HeadingHandle {
        self.heading.clone()
    }

    /// Stop the task and get the tracker back.
    ///
    /// Returns `None` if the task panicked.
    pub fn stop(mut self) -> Option<HeadingTracker> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Option<HeadingTracker> {
        self.stop.store(true, Ordering::Relaxed);

        let tracker = self.join_handle.take().and_then(|h| h.join().ok());

        if tracker.is_none() {
            warn!("Heading task did not exit cleanly");
        }

        tracker
    }
}

impl Drop for HeadingTask {
    fn drop(&mut self) {
        if self.join_handle.is_some() {
            self.stop_and_join();
        }
    }
}
