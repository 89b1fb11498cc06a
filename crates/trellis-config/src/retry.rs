use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enums::RetryBackoff;

/// Retry policy for transactions that fail with a retryable store error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  /// Total attempts, including the first one.
  pub max_attempts: u32,
  pub backoff: RetryBackoff,
  pub initial_delay_ms: u64,
  pub max_delay_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: 10,
      backoff: RetryBackoff::Exponential,
      initial_delay_ms: 10,
      max_delay_ms: 1_000,
    }
  }
}

impl RetryConfig {
  /// Delay to wait before the given retry (1 for the first retry).
  pub fn delay_for(&self, retry: u32) -> Duration {
    let initial = self.initial_delay_ms;
    let millis = match self.backoff {
      RetryBackoff::Constant => initial,
      RetryBackoff::Linear => initial.saturating_mul(u64::from(retry)),
      RetryBackoff::Exponential => {
        let shift = retry.saturating_sub(1).min(32);
        initial.saturating_mul(1u64 << shift)
      }
    };
    Duration::from_millis(millis.min(self.max_delay_ms))
  }
}
