use std::time::{Duration, Instant};

use leaddocs_protocol::UploadProgress;
use leaddocs_protocol::constants::PROGRESS_INTERVAL;

/// Paces progress events and keeps them monotonic.
///
/// The first report and the final (`loaded >= total`) report always pass;
/// anything else needs `interval` to have elapsed since the last emitted one.
/// A report whose percentage is below the last emitted one is dropped, as is
/// anything after 100 % has been emitted.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
    last_percent: Option<u8>,
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(PROGRESS_INTERVAL)
    }
}

impl ProgressThrottle {
    /// Creates a throttle with the given minimum spacing.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            last_percent: None,
        }
    }

    /// Decides whether `progress`, observed at `now`, should be emitted.
    pub fn admit(&mut self, progress: &UploadProgress, now: Instant) -> bool {
        if let Some(last) = self.last_percent
            && (last == 100 || progress.percent < last)
        {
            return false;
        }

        let is_final = progress.total > 0 && progress.loaded >= progress.total;
        let due = self
            .last_emit
            .is_none_or(|t| now.saturating_duration_since(t) >= self.interval);
        if !due && !is_final {
            return false;
        }

        self.last_emit = Some(now);
        self.last_percent = Some(progress.percent);
        true
    }

    /// Percentage of the most recently emitted event.
    pub fn last_percent(&self) -> Option<u8> {
        self.last_percent
    }

    /// Forgets all history.
    pub fn reset(&mut self) {
        self.last_emit = None;
        self.last_percent = None;
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

/// Average transfer speed since the first progress report of an attempt.
///
/// `loaded / elapsed`, no smoothing window.
#[derive(Debug, Clone, Default)]
pub struct SpeedCalculator {
    started: Option<Instant>,
    bytes_per_second: f64,
}

impl SpeedCalculator {
    /// Creates an idle calculator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the cumulative byte count observed at `now`.
    ///
    /// Returns the updated speed; stays 0.0 until time has passed since
    /// the first sample.
    pub fn record(&mut self, loaded: u64, now: Instant) -> f64 {
        let started = *self.started.get_or_insert(now);
        let elapsed = now.saturating_duration_since(started);
        if !elapsed.is_zero() && loaded > 0 {
            self.bytes_per_second = loaded as f64 / elapsed.as_secs_f64();
        }
        self.bytes_per_second
    }

    /// Returns the current average speed in bytes/second.
    pub fn bytes_per_second(&self) -> f64 {
        self.bytes_per_second
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero or the estimate does not fit a `Duration`.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        if self.bytes_per_second <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(remaining_bytes as f64 / self.bytes_per_second).ok()
    }

    /// Clears the start instant and the speed.
    pub fn reset(&mut self) {
        self.started = None;
        self.bytes_per_second = 0.0;
    }
}
