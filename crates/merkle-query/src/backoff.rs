//! Backoff schedule for the connect loop.
//!
//! The schedule is deterministic: no jitter is applied. After the n-th
//! consecutive failed attempt the loop sleeps for
//!
//! ```text
//! b(n) = min(initial_backoff * 2^n, max_backoff)      n >= 1
//! ```
//!
//! so the first sleep is already twice `initial_backoff`. Each call to
//! [`MerkleQueryClient::connect`](crate::MerkleQueryClient::connect) starts a
//! fresh [`Backoff`].
//!
//! Sleeping itself goes through [`Sleeper`] so the loop can be driven by a
//! fake clock in tests.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::RetryPolicy;

/// Computes `min(initial * 2^failures, max)` with saturating arithmetic.
#[must_use]
pub fn delay_for(initial: Duration, max: Duration, failures: u32) -> Duration {
    let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
    initial.saturating_mul(factor).min(max)
}

/// Iterator over the delays of one connect cycle.
///
/// The first item is the delay after the first failure.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    /// Starts a schedule at zero failures.
    #[must_use]
    pub fn new(policy: &RetryPolicy) -> Self {
        Self { initial: policy.initial_backoff, max: policy.max_backoff, failures: 0 }
    }

    /// Number of delays handed out so far.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Records a failure and returns the delay to sleep before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        delay_for(self.initial, self.max, self.failures)
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}

/// Suspends the connect loop between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Sleeps for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
