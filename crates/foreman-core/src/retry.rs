//! Retry backoff policy.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff for transient execution failures.
///
/// delay = base_delay * multiplier^(attempt - 1), capped at `max_delay`,
/// then widened by up to ±`jitter` (a fraction) so dispatchers that failed
/// the same batch of tasks do not hammer the store in lockstep.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_delay: Duration::from_secs(600),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Fixed delay, no growth, no jitter. Mostly useful in tests.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
            jitter: 0.0,
        }
    }

    /// Delay before retry number `attempt` (1-indexed: the first retry is
    /// attempt 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());

        let factor = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter)
        } else {
            1.0
        };
        Duration::from_secs_f64((capped * factor).max(0.0))
    }
}
