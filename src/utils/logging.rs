use log::{log_enabled, warn, Level};
use std::time::{Duration, Instant};

/// Scoped timer for a step stage; traces on entry and exit.
///
/// Call [`ScopedTimer::finish`] to also get the elapsed time back for the
/// step profile.
pub struct ScopedTimer {
    label: &'static str,
    start: Instant,
    reported: bool,
}

impl ScopedTimer {
    pub fn new(label: &'static str) -> Self {
        if log_enabled!(Level::Trace) {
            log::trace!("start {label}");
        }
        Self {
            label,
            start: Instant::now(),
            reported: false,
        }
    }

    pub fn finish(mut self) -> Duration {
        self.report()
    }

    fn report(&mut self) -> Duration {
        let elapsed = self.start.elapsed();
        if !self.reported && log_enabled!(Level::Trace) {
            log::trace!("end {} ({} µs)", self.label, elapsed.as_micros());
        }
        self.reported = true;
        elapsed
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        if !self.reported {
            self.report();
        }
    }
}

/// Warns when a step took longer than the configured frame budget.
pub fn warn_if_frame_budget_exceeded(duration: Duration, budget_ms: f32) {
    let elapsed_ms = duration.as_secs_f32() * 1000.0;
    if elapsed_ms > budget_ms {
        warn!("step exceeded budget: {elapsed_ms:.2} ms > {budget_ms:.2} ms");
    }
}
