//! Per-document retry accounting.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use leaddocs_protocol::constants::MAX_RETRY_ATTEMPTS;
use tracing::{debug, warn};

/// Failure history of one upload target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Consecutive failures, `0..=max_attempts`.
    pub consecutive_failures: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    /// True once a failure has been recorded and the target may be retried.
    pub is_retrying: bool,
    /// Set when a failure arrives with the counter already at the ceiling.
    pub exhausted: bool,
}

/// Caps consecutive failures per document id.
///
/// Failures up to the ceiling are accepted. The next one is refused and the
/// target stays refused until [`RetryGovernor::reset`]. Success is the only
/// other way back to zero.
#[derive(Debug)]
pub struct RetryGovernor {
    max_attempts: u32,
    states: Mutex<HashMap<String, RetryState>>,
}

impl Default for RetryGovernor {
    fn default() -> Self {
        Self::new(MAX_RETRY_ATTEMPTS)
    }
}

impl RetryGovernor {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Records a failure for `target_id`.
    ///
    /// Returns `false` when the counter had already reached the ceiling; the
    /// target is then exhausted and further attempts must be refused.
    pub fn track_attempt(&self, target_id: &str) -> bool {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states.entry(target_id.to_string()).or_default();
        state.last_failure_time = Some(Utc::now());

        if state.consecutive_failures >= self.max_attempts {
            state.exhausted = true;
            state.is_retrying = false;
            warn!(
                document = %target_id,
                failures = state.consecutive_failures,
                "retry ceiling reached"
            );
            return false;
        }

        state.consecutive_failures += 1;
        state.is_retrying = true;
        debug!(
            document = %target_id,
            attempt = state.consecutive_failures,
            max = self.max_attempts,
            "upload failure recorded"
        );
        true
    }

    /// Clears the history of `target_id`.
    pub fn reset(&self, target_id: &str) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        if states.remove(target_id).is_some() {
            debug!(document = %target_id, "retry state reset");
        }
    }

    pub fn retry_count(&self, target_id: &str) -> u32 {
        self.state(target_id).consecutive_failures
    }

    /// True once the target has been refused.
    pub fn max_retries_reached(&self, target_id: &str) -> bool {
        self.state(target_id).exhausted
    }

    /// Snapshot of the state for `target_id` (default if untracked).
    pub fn state(&self, target_id: &str) -> RetryState {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.get(target_id).cloned().unwrap_or_default()
    }
}
