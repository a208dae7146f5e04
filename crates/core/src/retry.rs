//! Bounded exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Retry schedule: `attempts` tries, sleeping `initial`, `initial * factor`, ... capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
	pub attempts: u32,
	pub initial: Duration,
	pub max: Duration,
	pub factor: u32,
}

impl Default for Backoff {
	fn default() -> Self {
		Self {
			attempts: 5,
			initial: Duration::from_millis(100),
			max: Duration::from_secs(1),
			factor: 2,
		}
	}
}

impl Backoff {
	pub fn new(attempts: u32, initial: Duration, max: Duration) -> Self {
		Self {
			attempts,
			initial,
			max,
			factor: 2,
		}
	}

	/// Delay to sleep after failed attempt `attempt` (zero-based).
	pub fn delay(&self, attempt: u32) -> Duration {
		let factor = self.factor.max(1).saturating_pow(attempt);
		self.initial.saturating_mul(factor).min(self.max)
	}

	/// Runs `op` until it yields `Some`, sleeping between attempts.
	///
	/// Returns `None` once every attempt has failed.
	pub async fn retry<T, F, Fut>(&self, label: &str, mut op: F) -> Option<T>
	where
		F: FnMut(u32) -> Fut,
		Fut: Future<Output = Option<T>>,
	{
		for attempt in 0..self.attempts {
			if let Some(value) = op(attempt).await {
				return Some(value);
			}
			if attempt + 1 < self.attempts {
				let delay = self.delay(attempt);
				debug!(target = "extdev", label, attempt, delay_ms = delay.as_millis() as u64, "retrying");
				tokio::time::sleep(delay).await;
			}
		}
		None
	}
}
