//! Whole-run retry policy.
//!
//! A page failure aborts the run it belongs to. Another attempt is a fresh
//! run from the start, spaced out by a doubling, jittered delay. Only
//! errors for which [`Error::is_transient`] holds are tried again.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use pinsync_common::Error;

/// How often and how patiently a failed sync is started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Runs started after the first one fails.
    pub max_retries: u32,
    /// Pause before the first retry.
    pub initial_delay_ms: u64,
    /// Ceiling for the doubled pause.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Whether a run that failed with `error` on attempt `attempt` (zero
    /// based) should be started again.
    pub fn should_retry(&self, attempt: u32, error: &Error) -> bool {
        attempt < self.max_retries && error.is_transient()
    }

    /// Pause before retry `retry` (zero based), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let millis = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    /// Pause before retry `retry`, spread by up to 25% either way.
    pub fn delay(&self, retry: u32) -> Duration {
        let spread = 0.75 + rand::random::<f64>() * 0.5;
        self.base_delay(retry).mul_f64(spread)
    }
}
