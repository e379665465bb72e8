//! Bar Retention
//!
//! Periodically deletes stored bars older than the configured age.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BarStore, StoreError};
use crate::infrastructure::metrics;

/// Shortest sweep period the job will schedule.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Retention window and sweep cadence.
#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    /// Bars with a timestamp older than `now - max_age` are deleted.
    pub max_age: TimeDelta,
    /// Time between sweeps.
    pub interval: Duration,
}

impl RetentionConfig {
    /// Keep `days` days of bars, sweeping every `interval`.
    ///
    /// Returns `None` when `days` is zero (retention disabled).
    #[must_use]
    pub fn from_days(days: u32, interval: Duration) -> Option<Self> {
        (days > 0).then(|| Self {
            max_age: TimeDelta::days(i64::from(days)),
            interval: interval.max(MIN_SWEEP_INTERVAL),
        })
    }

    /// Sweep period actually scheduled, never below [`MIN_SWEEP_INTERVAL`].
    #[must_use]
    pub fn sweep_period(&self) -> Duration {
        self.interval.max(MIN_SWEEP_INTERVAL)
    }
}

/// Background sweep over a [`BarStore`].
pub struct RetentionJob {
    store: Arc<dyn BarStore>,
    config: RetentionConfig,
}

impl std::fmt::Debug for RetentionJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionJob")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetentionJob {
    /// Create a job over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn BarStore>, config: RetentionConfig) -> Self {
        Self { store, config }
    }

    /// Delete bars older than the window, measured from `now`.
    ///
    /// # Errors
    ///
    /// Returns the store error if the delete fails.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let cutoff = now - self.config.max_age;
        let deleted = self.store.delete_bars_before(cutoff).await?;
        metrics::record_retention_deleted(deleted);
        tracing::info!(%cutoff, deleted, "Retention sweep complete");
        Ok(deleted)
    }

    /// Sweep on the configured interval until cancelled.
    ///
    /// The first sweep runs immediately. A failed sweep is logged and the
    /// next one proceeds on schedule.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.sweep_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            max_age_days = self.config.max_age.num_days(),
            interval_secs = self.config.interval.as_secs(),
            "Retention job started"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once(Utc::now()).await {
                        tracing::error!(error = %e, "Retention sweep failed");
                    }
                }
            }
        }

        tracing::info!("Retention job stopped");
    }
}
