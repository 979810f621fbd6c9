//! Requeue policy for failed reconciles.
//!
//! Attempts are tracked per key; the delay doubles with each consecutive
//! failure and is capped. A successful reconcile resets the key.

use std::collections::HashMap;
use std::time::Duration;

use kube::runtime::controller::Action;
use parking_lot::Mutex;
use tracing::*;

use crate::{Error, ErrorKind};

/// Consecutive failure counts per key
#[derive(Debug, Default)]
pub struct RetryTracker {
    attempts: Mutex<HashMap<String, u32>>,
}

impl RetryTracker {
    pub fn increment(&self, key: &str) -> u32 {
        let mut attempts = self.attempts.lock();
        let count = attempts.entry(key.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn reset(&self, key: &str) {
        self.attempts.lock().remove(key);
    }

    pub fn get(&self, key: &str) -> u32 {
        self.attempts.lock().get(key).copied().unwrap_or(0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(5 * 60),
        }
    }
}

impl RetryPolicy {
    /// `base * 2^(attempt - 1)`, capped at `max`
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        2u32.checked_pow(exponent)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Decide when `key` runs again after `error`
    pub fn action_for(&self, tracker: &RetryTracker, key: &str, error: &Error) -> Action {
        match error.kind() {
            ErrorKind::Cancelled => {
                debug!(%key, "Reconcile cancelled, not requeueing");
                Action::await_change()
            }
            ErrorKind::Permanent => {
                let attempt = tracker.increment(key);
                warn!(%key, attempt, error = %error, "Reconcile failed permanently, retrying at the slowest rate");
                Action::requeue(self.max)
            }
            ErrorKind::Transient | ErrorKind::NotFound => {
                let attempt = tracker.increment(key);
                let delay = self.delay(attempt);
                warn!(%key, attempt, delay_secs = delay.as_secs(), error = %error, "Reconcile failed, requeueing");
                Action::requeue(delay)
            }
        }
    }
}
