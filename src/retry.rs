//! Retry policies shared by every component that makes outbound calls.

use std::future::Future;
use std::time::Duration;

use crate::clock::Clock;

/// How long to wait after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every attempt.
    Fixed(Duration),
    /// `initial * factor^(attempt - 1)`.
    Exponential { initial: Duration, factor: u32 },
}

/// Maximum attempt count plus a backoff function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub const fn exponential(max_attempts: u32, initial: Duration, factor: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { initial, factor },
        }
    }

    /// LLM artifact generation: 3 attempts, 5s apart.
    pub const fn generation() -> Self {
        Self::fixed(3, Duration::from_secs(5))
    }

    /// Evaluation callback: 6 attempts, 1s doubling.
    pub const fn evaluation() -> Self {
        Self::exponential(6, Duration::from_secs(1), 2)
    }

    /// Delay after the given 1-based attempt fails.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, factor } => {
                let exponent = attempt.saturating_sub(1);
                initial.saturating_mul(factor.saturating_pow(exponent))
            }
        }
    }

    /// Run `op` until it succeeds or attempts run out, sleeping on `clock`
    /// between attempts (never after the last one).
    ///
    /// `op` receives the 1-based attempt number. On exhaustion the last error
    /// is returned together with the attempt count.
    pub async fn run<T, E, F, Fut>(&self, clock: &dyn Clock, mut op: F) -> Result<T, (u32, E)>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= attempts => return Err((attempt, err)),
                Err(err) => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_secs = delay.as_secs_f64(),
                        error = %err,
                        "Attempt failed, retrying"
                    );
                    clock.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
