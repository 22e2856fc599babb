//! Retry policy for plugin fetches.
//!
//! Only [`ProviderError::Transient`] failures are retried. A server-supplied
//! `Retry-After` replaces the computed backoff, capped at the maximum delay.

use std::time::Duration;

use cloudmon_core::ProviderError;
use serde::{Deserialize, Serialize};

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Whether to use exponential backoff.
    pub exponential_backoff: bool,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Creates a policy with the given retry budget.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: 1_000,
            exponential_backoff: true,
            max_delay_ms: 60_000,
        }
    }

    /// Disables retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            exponential_backoff: false,
            max_delay_ms: 0,
        }
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = duration_ms(delay);
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = duration_ms(delay);
        self
    }

    /// Enables or disables exponential backoff.
    pub fn with_exponential_backoff(mut self, enabled: bool) -> Self {
        self.exponential_backoff = enabled;
        self
    }

    /// Total number of plugin calls allowed per fetch cycle.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculates the delay before retry number `retry` (1-based).
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let delay = if self.exponential_backoff {
            let factor = 2u64.saturating_pow(retry.saturating_sub(1));
            self.base_delay_ms.saturating_mul(factor)
        } else {
            self.base_delay_ms
        };

        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Delay before retry number `retry`, honoring a `Retry-After` hint.
    pub fn delay_for(&self, retry: u32, error: &ProviderError) -> Duration {
        match error.retry_after() {
            Some(hint) => hint.min(Duration::from_millis(self.max_delay_ms)),
            None => self.delay_for_attempt(retry),
        }
    }

    /// Returns true if another attempt should follow `attempts` failed ones.
    pub fn should_retry(&self, error: &ProviderError, attempts: u32) -> bool {
        error.is_transient() && attempts < self.max_attempts()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
