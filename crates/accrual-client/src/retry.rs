//! Retry policy for transient accrual failures.
//!
//! Delays grow linearly with the attempt number and carry a random jitter so
//! that retries from several orders do not line up. Every delay is clamped to
//! the configured `[min_wait, max_wait]` window.

use accrual_config::AccrualConfig;
use rand::Rng;
use std::time::Duration;

/// Bounded linear-jitter retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Retries allowed after the first attempt.
	pub max_retries: u32,
	/// Smallest delay between two attempts.
	pub min_wait: Duration,
	/// Largest delay between two attempts.
	pub max_wait: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 3,
			min_wait: Duration::from_secs(1),
			max_wait: Duration::from_secs(30),
		}
	}
}

impl RetryPolicy {
	pub fn from_config(config: &AccrualConfig) -> Self {
		Self {
			max_retries: config.max_retries,
			min_wait: config.retry_wait_min(),
			max_wait: config.retry_wait_max(),
		}
	}

	/// Total number of attempts, including the first one.
	pub fn max_attempts(&self) -> u32 {
		self.max_retries.saturating_add(1)
	}

	/// Delay before retry number `retry` (starting at 1) for a jitter factor in `[0, 1]`.
	///
	/// The linear part is `min_wait * retry`; the jitter adds up to half of it.
	pub fn backoff(&self, retry: u32, jitter: f64) -> Duration {
		let linear = self.min_wait.saturating_mul(retry.max(1));
		let jitter = linear.mul_f64(jitter.clamp(0.0, 1.0) / 2.0);
		let upper = self.max_wait.max(self.min_wait);
		(linear + jitter).clamp(self.min_wait, upper)
	}

	/// Delay before retry number `retry` with a random jitter.
	pub fn next_delay(&self, retry: u32) -> Duration {
		let jitter = rand::thread_rng().gen_range(0.0..=1.0);
		self.backoff(retry, jitter)
	}
}
