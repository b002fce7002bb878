//! Scheduled and on-demand corpus refresh with exponential backoff.

use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{CorpusCache, CorpusSource, Error, RefreshReport, Result};
use ymd_config::Corpus;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub initial_backoff: Duration,
	pub factor: f64,
	pub max_backoff: Duration,
}
impl RetryPolicy {
	pub fn from_config(cfg: &Corpus) -> Self {
		Self {
			max_attempts: cfg.retry_max_attempts.max(1),
			initial_backoff: Duration::from_millis(cfg.retry_initial_backoff_ms),
			factor: cfg.retry_backoff_factor,
			max_backoff: Duration::from_millis(cfg.retry_max_backoff_ms),
		}
	}

	/// Delay after the `failures`-th consecutive failure (1-based), capped at `max_backoff`.
	pub fn backoff(&self, failures: u32) -> Duration {
		let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
		let initial_ms = self.initial_backoff.as_millis() as f64;
		let max_ms = self.max_backoff.as_millis() as f64;
		let delay_ms = (initial_ms * self.factor.powi(exponent)).min(max_ms);

		if delay_ms.is_finite() && delay_ms > 0.0 {
			Duration::from_millis(delay_ms as u64)
		} else {
			self.max_backoff
		}
	}
}

/// Retries [`CorpusCache::refresh`] until it succeeds or attempts run out. The current snapshot
/// keeps serving throughout.
pub async fn refresh_with_retry(
	cache: &CorpusCache,
	source: &dyn CorpusSource,
	policy: &RetryPolicy,
	cancel: &CancellationToken,
) -> Result<RefreshReport> {
	let mut failures = 0;

	loop {
		let err = match cache.refresh(source).await {
			Ok(report) => return Ok(report),
			Err(err) => err,
		};

		failures += 1;

		if failures >= policy.max_attempts {
			tracing::error!(error = %err, attempts = failures, "Corpus refresh failed.");

			return Err(err);
		}

		let delay = policy.backoff(failures);

		tracing::warn!(
			error = %err,
			attempt = failures,
			delay_ms = delay.as_millis() as u64,
			"Corpus refresh attempt failed. Retrying."
		);

		tokio::select! {
			_ = cancel.cancelled() => return Err(Error::Cancelled),
			_ = tokio::time::sleep(delay) => {},
		}
	}
}

/// Refreshes on every `interval` tick until `cancel` fires. The first tick is skipped since the
/// cache was just loaded.
pub fn spawn_refresh_loop(
	cache: Arc<CorpusCache>,
	source: Arc<dyn CorpusSource>,
	interval: Duration,
	policy: RetryPolicy,
	cancel: CancellationToken,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(interval);

		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		ticker.tick().await;

		loop {
			tokio::select! {
				_ = cancel.cancelled() => break,
				_ = ticker.tick() => {},
			}

			match refresh_with_retry(&cache, source.as_ref(), &policy, &cancel).await {
				Ok(report) => tracing::debug!(
					snapshot_version = report.snapshot_version,
					changed = report.changed,
					"Scheduled corpus refresh finished."
				),
				Err(Error::Cancelled) => break,
				Err(err) => tracing::warn!(
					error = %err,
					"Scheduled corpus refresh exhausted retries. Keeping the current snapshot."
				),
			}
		}

		tracing::info!("Corpus refresh loop stopped.");
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn policy() -> RetryPolicy {
		RetryPolicy {
			max_attempts: 3,
			initial_backoff: Duration::from_millis(1_000),
			factor: 2.0,
			max_backoff: Duration::from_millis(3_000),
		}
	}

	#[test]
	fn backoff_grows_and_caps() {
		let policy = policy();

		assert_eq!(policy.backoff(1), Duration::from_millis(1_000));
		assert_eq!(policy.backoff(2), Duration::from_millis(2_000));
		assert_eq!(policy.backoff(3), Duration::from_millis(3_000));
		assert_eq!(policy.backoff(40), Duration::from_millis(3_000));
	}

	#[test]
	fn config_defaults_match_policy() {
		let policy = RetryPolicy::from_config(&Corpus::default());

		assert_eq!(policy.max_attempts, 3);
		assert_eq!(policy.backoff(1), Duration::from_secs(1));
		assert_eq!(policy.backoff(2), Duration::from_secs(2));
	}
}
