//! Clock abstraction for elapsed-time checks and sleeps.
//!
//! Every backoff, settle delay and polling interval goes through a [`Clock`]
//! so the retry and timeout behaviour can be exercised without real waits.

use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Provides the current instant and async sleeping.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Returns the current monotonic instant.
    fn now(&self) -> Instant;

    /// Suspends the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `tokio::time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
