use crate::config::WatcherConfig;
use crate::core::{EntityKind, Result, SyncError};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Bounded retry with exponential backoff: `base_delay * 2^attempt` before retry
/// `attempt` (1-based), so `max_retries = N` allows `N + 1` attempts in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub kind: EntityKind,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(kind: EntityKind, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            kind,
            max_retries,
            base_delay,
        }
    }

    pub fn for_watcher(watcher: &WatcherConfig, base_delay: Duration) -> Self {
        Self::new(watcher.file_type, watcher.max_retry_attempts, base_delay)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `op` until it succeeds or retries are exhausted. `op` receives the
    /// zero-based attempt number.
    ///
    /// Cancellation is observed between attempts only; an attempt in progress is never
    /// interrupted. A cancelled wait returns `SyncError::Cancelled`.
    pub async fn execute<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt >= self.max_retries {
                return Err(err);
            }
            attempt += 1;

            let delay = self.backoff(attempt);
            warn!(
                kind = %self.kind,
                file = label,
                attempt,
                max_retries = self.max_retries,
                delay_secs = delay.as_secs_f64(),
                error = %err,
                "attempt failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
