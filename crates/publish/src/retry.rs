//! Retry budget and backoff.

use async_trait::async_trait;
use std::time::Duration;

/// Bounds on how hard the [`Publisher`](crate::Publisher) tries per record.
///
/// Defaults: 4 attempts (1 initial + 3 retries), backoff 200ms doubling up
/// to 5s, 10s per connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per record, including the first. At least 1.
    pub max_attempts: u32,
    /// Wait before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for any single wait.
    pub max_backoff: Duration,
    /// Upper bound for a single connection attempt.
    pub connect_timeout: Duration,
}
impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        }
    }
}
impl RetryPolicy {
    /// Wait before retry number `retry` (1-based): `initial * 2^(retry-1)`,
    /// capped at `max_backoff`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Something that can wait. Injected so tests don't sleep.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Real wall-clock waiting via [`tokio::time::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
