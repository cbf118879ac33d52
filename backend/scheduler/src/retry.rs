//! Exponential backoff with jitter for transient grant failures.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// In-cycle retry policy for transient grant failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per key per cycle, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    pub base_delay_ms: u64,
    /// Multiplier for each subsequent wait.
    pub backoff_factor: f64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Add random jitter (±25% of the computed delay).
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            backoff_factor: 2.0,
            max_delay_ms: 5_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay to wait after failed attempt `attempt_number` (1-indexed).
    pub fn delay_for(&self, attempt_number: u32) -> Duration {
        if attempt_number == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt_number - 1).unwrap_or(i32::MAX);
        let delay_ms = self.base_delay_ms as f64 * self.backoff_factor.powi(exponent);
        let delay_ms = delay_ms.min(self.max_delay_ms as f64) as u64;

        let delay_ms = if self.jitter {
            let spread = delay_ms / 4;
            if spread > 0 {
                let offset = rand::thread_rng().gen_range(0..=spread * 2);
                (delay_ms + offset).saturating_sub(spread)
            } else {
                delay_ms
            }
        } else {
            delay_ms
        };

        Duration::from_millis(delay_ms)
    }

    pub fn should_retry(&self, attempt_number: u32) -> bool {
        attempt_number < self.max_attempts
    }
}
