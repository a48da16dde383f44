//! Retry Policy for Failed Records
//!
//! The dispatcher never retries on its own: per-record failures come back
//! through the failure handler and the record's `fail_count`. This policy
//! decides what happens next for each failed record.
//!
//! ## Decision
//!
//! ```text
//! fail_count < max_attempts  ─→ Retry(backoff(fail_count - 1))
//! fail_count >= max_attempts ─→ Drop
//! ```
//!
//! ## Backoff
//!
//! ```text
//! backoff = min(initial_backoff * multiplier^attempt, max_backoff)
//!
//! With defaults (100ms initial, 2x multiplier, 5s max):
//! - after 1st failure: 100ms
//! - after 2nd failure: 200ms
//! - after 3rd failure: 400ms
//! ```
//!
//! Throughput-exceeded rejections are retried like any other failure; the
//! backoff is what relieves the shard.

use std::time::Duration;

use kinetic_core::Message;
use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Dispatch attempts per record, including the first one
    pub max_attempts: u32,

    /// Backoff after the first failure
    pub initial_backoff: Duration,

    /// Upper bound on any backoff
    pub max_backoff: Duration,

    /// Growth factor between consecutive backoffs
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

/// What to do with a record after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Resubmit after waiting this long.
    Retry(Duration),
    /// Give up on the record.
    Drop,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Backoff before retry number `attempt` (0-indexed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        if !backoff_ms.is_finite() || backoff_ms >= self.max_backoff.as_millis() as f64 {
            return self.max_backoff;
        }
        Duration::from_millis(backoff_ms as u64).min(self.max_backoff)
    }

    /// `backoff` scaled by a random factor in [0.75, 1.25) so workers that
    /// failed together do not retry in lockstep.
    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        let factor = rand::thread_rng().gen_range(0.75..1.25);
        base.mul_f64(factor)
    }

    /// Decide the fate of a record that just failed.
    pub fn decide(&self, message: &Message) -> RetryDecision {
        if message.fail_count >= self.max_attempts {
            RetryDecision::Drop
        } else {
            RetryDecision::Retry(self.jittered_backoff(message.fail_count.saturating_sub(1)))
        }
    }
}
