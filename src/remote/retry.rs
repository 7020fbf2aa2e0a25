//! Bounded retry wrapper for individual remote calls.
//!
//! Only rate limiting is retried, with linear backoff. Every other
//! failure is returned on the first attempt so the sync job can record
//! it and move on; the next scheduled run picks the item up again.

use std::future::Future;
use std::time::Duration;

use super::{RemoteError, RemoteResult};

/// Retry policy for a single remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(600),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Run `op`, retrying while it reports [`RemoteError::RateLimited`].
    pub async fn run<T, F, Fut>(&self, mut op: F) -> RemoteResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(RemoteError::RateLimited) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!(attempt, "rate limited, backing off");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                other => return other,
            }
        }
    }
}
