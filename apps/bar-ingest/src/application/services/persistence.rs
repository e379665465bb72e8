//! Persistence Sink
//!
//! Turns aggregate bars into stored rows: resolve (or create) the asset for
//! the bar's symbol, convert the period start to a UTC timestamp, and insert
//! the bar idempotently.
//!
//! Writes run on a fixed set of lanes. Each symbol hashes to exactly one
//! lane, so bars for the same symbol are written in arrival order while
//! different symbols proceed in parallel. The feed reader only ever waits a
//! bounded time for lane capacity; past that the bar is dropped and logged.
//! A lane that times out is marked saturated: later bars for it are shed
//! without waiting until the writer has drained half of its queue, so one
//! slow lane costs a frame at most one enqueue timeout.

use std::collections::HashMap;
use std::hash::{BuildHasher, BuildHasherDefault, DefaultHasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::EnqueueError;
use crate::application::ports::{BarStore, BarWrite, StoreError};
use crate::domain::market_data::{AggregateBar, AssetId, AssetType, BarRow};
use crate::domain::subscription::Symbol;
use crate::infrastructure::metrics::{self, DropReason, PersistOutcome};

// =============================================================================
// Errors
// =============================================================================

/// Error persisting a single bar.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The period start cannot be represented as a UTC timestamp.
    #[error("Period start out of range: {period_start_ms}ms")]
    InvalidTimestamp {
        /// Raw epoch milliseconds.
        period_start_ms: i64,
    },

    /// Asset creation conflicted but the follow-up lookup found nothing.
    #[error("Asset for {symbol} vanished after create conflict")]
    AssetUnresolved {
        /// Symbol being resolved.
        symbol: Symbol,
    },
}

// =============================================================================
// Persistence Sink
// =============================================================================

/// Writes bars to a [`BarStore`], creating assets on first sight.
pub struct PersistenceSink {
    store: Arc<dyn BarStore>,
    /// Symbol to asset id, filled as assets are resolved.
    assets: RwLock<HashMap<Symbol, AssetId>>,
}

impl std::fmt::Debug for PersistenceSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceSink")
            .field("cached_assets", &self.assets.read().len())
            .finish_non_exhaustive()
    }
}

impl PersistenceSink {
    /// Create a sink over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn BarStore>) -> Self {
        Self {
            store,
            assets: RwLock::new(HashMap::new()),
        }
    }

    /// Persist one bar.
    ///
    /// Re-delivery of a bar already stored returns [`BarWrite::Duplicate`].
    ///
    /// # Errors
    ///
    /// Returns an error if the timestamp is out of range or the store fails.
    pub async fn store(&self, bar: &AggregateBar) -> Result<BarWrite, PersistError> {
        let timestamp = bar
            .period_start()
            .ok_or(PersistError::InvalidTimestamp {
                period_start_ms: bar.period_start_ms,
            })?;
        let asset_id = self.resolve_asset(&bar.symbol).await?;
        let row = BarRow::from_bar(asset_id, timestamp, bar);
        Ok(self.store.insert_bar(&row).await?)
    }

    /// Resolve the asset id for a symbol, creating the asset if needed.
    ///
    /// Concurrent first sightings of a symbol converge on a single asset:
    /// the loser of the create race falls back to a lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the asset cannot be found
    /// after a create conflict.
    pub async fn resolve_asset(&self, symbol: &str) -> Result<AssetId, PersistError> {
        if let Some(id) = self.assets.read().get(symbol).copied() {
            return Ok(id);
        }

        if let Some(asset) = self.store.lookup_asset_by_symbol(symbol).await? {
            return Ok(self.remember(symbol, asset.asset_id));
        }

        match self
            .store
            .create_asset(symbol, symbol, AssetType::default())
            .await
        {
            Ok(asset) => {
                tracing::info!(symbol, asset_id = asset.asset_id, "Created asset");
                Ok(self.remember(symbol, asset.asset_id))
            }
            Err(StoreError::Conflict { .. }) => {
                tracing::debug!(symbol, "Asset create raced, looking up winner");
                let asset = self
                    .store
                    .lookup_asset_by_symbol(symbol)
                    .await?
                    .ok_or_else(|| PersistError::AssetUnresolved {
                        symbol: symbol.to_string(),
                    })?;
                Ok(self.remember(symbol, asset.asset_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn remember(&self, symbol: &str, asset_id: AssetId) -> AssetId {
        self.assets.write().insert(symbol.to_string(), asset_id);
        asset_id
    }
}

// =============================================================================
// Persistence Lanes
// =============================================================================

/// Lane configuration.
#[derive(Debug, Clone)]
pub struct LaneConfig {
    /// Number of lanes (parallel writers).
    pub lanes: usize,
    /// Bounded queue depth per lane.
    pub capacity: usize,
    /// Maximum time `submit` waits for lane capacity.
    pub enqueue_timeout: Duration,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            lanes: 4,
            capacity: 1024,
            enqueue_timeout: Duration::from_secs(2),
        }
    }
}

/// Symbol-partitioned bounded queues in front of a [`PersistenceSink`].
#[derive(Debug, Clone)]
pub struct PersistenceLanes {
    senders: Vec<mpsc::Sender<AggregateBar>>,
    /// Per lane: set after an enqueue timeout, cleared once the lane drains.
    saturated: Arc<[AtomicBool]>,
    enqueue_timeout: Duration,
}

impl PersistenceLanes {
    /// Spawn one writer task per lane.
    ///
    /// Writers stop when `cancel` fires or when every `PersistenceLanes`
    /// clone has been dropped and their queues drained.
    #[must_use]
    pub fn spawn(
        sink: Arc<PersistenceSink>,
        config: &LaneConfig,
        cancel: &CancellationToken,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let lanes = config.lanes.max(1);
        let mut senders = Vec::with_capacity(lanes);
        let mut handles = Vec::with_capacity(lanes);

        for lane in 0..lanes {
            let (tx, rx) = mpsc::channel(config.capacity.max(1));
            senders.push(tx);
            handles.push(tokio::spawn(run_lane(
                lane,
                rx,
                Arc::clone(&sink),
                cancel.clone(),
            )));
        }

        (
            Self {
                senders,
                saturated: (0..lanes).map(|_| AtomicBool::new(false)).collect(),
                enqueue_timeout: config.enqueue_timeout,
            },
            handles,
        )
    }

    /// Number of lanes.
    #[must_use]
    pub fn lane_count(&self) -> usize {
        self.senders.len()
    }

    /// Lane index a symbol is pinned to.
    #[must_use]
    pub fn lane_for(&self, symbol: &str) -> usize {
        let hash = BuildHasherDefault::<DefaultHasher>::default().hash_one(symbol);
        usize::try_from(hash % self.senders.len() as u64).unwrap_or(0)
    }

    /// Queue a bar for persistence on its symbol's lane.
    ///
    /// Waits at most the configured enqueue timeout for capacity. After a
    /// timeout the lane is saturated and further bars are only offered
    /// without waiting, until the writer has freed half of the queue.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::Timeout`] when the lane stayed full,
    /// [`EnqueueError::Full`] when a saturated lane had no room, or
    /// [`EnqueueError::Closed`] when the lane writer has stopped.
    pub async fn submit(&self, bar: AggregateBar) -> Result<(), EnqueueError> {
        let lane = self.lane_for(&bar.symbol);
        let sender = &self.senders[lane];
        let saturated = &self.saturated[lane];

        if saturated.load(Ordering::Acquire) {
            if sender.capacity() * 2 < sender.max_capacity() {
                return self.shed(lane, bar);
            }
            if saturated.swap(false, Ordering::AcqRel) {
                tracing::info!(lane, "Persistence lane drained, resuming bounded waits");
            }
        }

        match sender.send_timeout(bar, self.enqueue_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(bar)) => {
                metrics::record_bar_dropped(DropReason::Timeout);
                if !saturated.swap(true, Ordering::AcqRel) {
                    tracing::warn!(
                        lane,
                        enqueue_timeout_ms = self.enqueue_timeout.as_millis(),
                        "Persistence lane saturated, shedding bars until it drains"
                    );
                }
                tracing::warn!(
                    symbol = %bar.symbol,
                    period_start_ms = bar.period_start_ms,
                    lane,
                    "Persistence lane full, dropping bar"
                );
                Err(EnqueueError::Timeout)
            }
            Err(SendTimeoutError::Closed(bar)) => Err(Self::closed(lane, &bar)),
        }
    }

    /// Whether a lane is currently shedding bars.
    #[must_use]
    pub fn is_saturated(&self, lane: usize) -> bool {
        self.saturated
            .get(lane)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    fn shed(&self, lane: usize, bar: AggregateBar) -> Result<(), EnqueueError> {
        match self.senders[lane].try_send(bar) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(bar)) => {
                metrics::record_bar_dropped(DropReason::Full);
                tracing::debug!(
                    symbol = %bar.symbol,
                    period_start_ms = bar.period_start_ms,
                    lane,
                    "Persistence lane saturated, dropping bar"
                );
                Err(EnqueueError::Full)
            }
            Err(TrySendError::Closed(bar)) => Err(Self::closed(lane, &bar)),
        }
    }

    fn closed(lane: usize, bar: &AggregateBar) -> EnqueueError {
        metrics::record_bar_dropped(DropReason::Closed);
        tracing::debug!(symbol = %bar.symbol, lane, "Persistence lane closed");
        EnqueueError::Closed
    }
}

async fn run_lane(
    lane: usize,
    mut rx: mpsc::Receiver<AggregateBar>,
    sink: Arc<PersistenceSink>,
    cancel: CancellationToken,
) {
    tracing::debug!(lane, "Persistence lane started");

    loop {
        let bar = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            bar = rx.recv() => match bar {
                Some(bar) => bar,
                None => break,
            },
        };

        let started = Instant::now();
        match sink.store(&bar).await {
            Ok(BarWrite::Inserted) => {
                metrics::record_persist(PersistOutcome::Inserted, started.elapsed());
                tracing::debug!(
                    symbol = %bar.symbol,
                    period_start_ms = bar.period_start_ms,
                    "Stored bar"
                );
            }
            Ok(BarWrite::Duplicate) => {
                metrics::record_persist(PersistOutcome::Duplicate, started.elapsed());
                tracing::debug!(
                    symbol = %bar.symbol,
                    period_start_ms = bar.period_start_ms,
                    "Bar already stored"
                );
            }
            Err(e) => {
                metrics::record_persist(PersistOutcome::Failed, started.elapsed());
                tracing::error!(
                    symbol = %bar.symbol,
                    period_start_ms = bar.period_start_ms,
                    error = %e,
                    "Failed to store bar"
                );
            }
        }
    }

    tracing::debug!(lane, "Persistence lane stopped");
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market_data::AssetRef;
    use crate::infrastructure::storage::InMemoryBarStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use mockall::mock;
    use rust_decimal::Decimal;
    use std::sync::atomic::AtomicUsize;

    mock! {
        Store {}

        #[async_trait]
        impl BarStore for Store {
            async fn lookup_asset_by_symbol(&self, symbol: &str) -> Result<Option<AssetRef>, StoreError>;
            async fn create_asset(
                &self,
                symbol: &str,
                name: &str,
                asset_type: AssetType,
            ) -> Result<AssetRef, StoreError>;
            async fn insert_bar(&self, row: &BarRow) -> Result<BarWrite, StoreError>;
            async fn delete_bars_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
        }
    }

    fn winner(symbol: &str) -> AssetRef {
        AssetRef {
            asset_id: 42,
            symbol: symbol.to_string(),
            name: "Apple Inc.".to_string(),
            asset_type: AssetType::Stock,
        }
    }

    fn bar(symbol: &str, period_start_ms: i64) -> AggregateBar {
        AggregateBar {
            symbol: symbol.to_string(),
            period_start_ms,
            period_end_ms: None,
            open: Decimal::new(1500, 1),
            high: Decimal::new(1510, 1),
            low: Decimal::new(1495, 1),
            close: Decimal::new(1505, 1),
            volume: Decimal::from(1_000_000),
            vwap: None,
        }
    }

    #[tokio::test]
    async fn first_bar_creates_asset_with_defaults() {
        let store = Arc::new(InMemoryBarStore::new());
        let sink = PersistenceSink::new(store.clone());

        let write = sink.store(&bar("AAPL", 1_700_000_000_000)).await.unwrap();

        assert_eq!(write, BarWrite::Inserted);
        let asset = store.asset("AAPL").unwrap();
        assert_eq!(asset.name, "AAPL");
        assert_eq!(asset.asset_type, AssetType::Stock);
        assert_eq!(store.bar_count(), 1);
    }

    #[tokio::test]
    async fn redelivery_is_duplicate() {
        let store = Arc::new(InMemoryBarStore::new());
        let sink = PersistenceSink::new(store.clone());
        let b = bar("AAPL", 1_700_000_000_000);

        sink.store(&b).await.unwrap();
        let second = sink.store(&b).await.unwrap();

        assert_eq!(second, BarWrite::Duplicate);
        assert_eq!(store.bar_count(), 1);
    }

    #[tokio::test]
    async fn existing_asset_is_reused() {
        let store = Arc::new(InMemoryBarStore::new());
        let existing = store
            .create_asset("MSFT", "Microsoft Corp", AssetType::Stock)
            .await
            .unwrap();
        let sink = PersistenceSink::new(store.clone());

        let id = sink.resolve_asset("MSFT").await.unwrap();

        assert_eq!(id, existing.asset_id);
        assert_eq!(store.asset_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_sightings_converge() {
        let store = Arc::new(InMemoryBarStore::new());
        let sink = Arc::new(PersistenceSink::new(store.clone()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let sink = Arc::clone(&sink);
            handles.push(tokio::spawn(async move {
                sink.store(&bar("NVDA", 1_700_000_000_000 + i * 60_000)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.asset_count(), 1);
        assert_eq!(store.bar_count(), 8);
    }

    #[tokio::test]
    async fn create_conflict_falls_back_to_winning_asset() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let mut store = MockStore::new();
        let seen = Arc::clone(&lookups);
        store
            .expect_lookup_asset_by_symbol()
            .times(2)
            .returning(move |symbol| {
                // Absent before the create, present once the other writer won.
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(None)
                } else {
                    Ok(Some(winner(symbol)))
                }
            });
        store
            .expect_create_asset()
            .times(1)
            .returning(|symbol, _, _| {
                Err(StoreError::Conflict {
                    symbol: symbol.to_string(),
                })
            });
        store.expect_insert_bar().times(2).returning(|row| {
            assert_eq!(row.asset_id, 42);
            Ok(BarWrite::Inserted)
        });
        let sink = PersistenceSink::new(Arc::new(store));

        let first = sink.store(&bar("AAPL", 1_700_000_000_000)).await.unwrap();
        // Cached after the fallback, so no further lookups.
        let second = sink.store(&bar("AAPL", 1_700_000_060_000)).await.unwrap();

        assert_eq!(first, BarWrite::Inserted);
        assert_eq!(second, BarWrite::Inserted);
        assert_eq!(lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn conflict_without_winner_is_unresolved() {
        let mut store = MockStore::new();
        store
            .expect_lookup_asset_by_symbol()
            .times(2)
            .returning(|_| Ok(None));
        store
            .expect_create_asset()
            .times(1)
            .returning(|symbol, _, _| {
                Err(StoreError::Conflict {
                    symbol: symbol.to_string(),
                })
            });
        store.expect_insert_bar().never();
        let sink = PersistenceSink::new(Arc::new(store));

        let err = sink
            .store(&bar("AAPL", 1_700_000_000_000))
            .await
            .unwrap_err();

        assert!(matches!(err, PersistError::AssetUnresolved { symbol } if symbol == "AAPL"));
    }

    #[tokio::test]
    async fn other_create_errors_propagate() {
        let mut store = MockStore::new();
        store
            .expect_lookup_asset_by_symbol()
            .times(1)
            .returning(|_| Ok(None));
        store.expect_create_asset().times(1).returning(|_, _, _| {
            Err(StoreError::Connection {
                message: "pool closed".to_string(),
            })
        });
        store.expect_insert_bar().never();
        let sink = PersistenceSink::new(Arc::new(store));

        let err = sink.resolve_asset("AAPL").await.unwrap_err();

        assert!(matches!(
            err,
            PersistError::Store(StoreError::Connection { .. })
        ));
    }

    #[tokio::test]
    async fn out_of_range_timestamp_is_rejected() {
        let store = Arc::new(InMemoryBarStore::new());
        let sink = PersistenceSink::new(store.clone());

        let err = sink.store(&bar("AAPL", i64::MAX)).await.unwrap_err();

        assert!(matches!(err, PersistError::InvalidTimestamp { .. }));
        assert_eq!(store.bar_count(), 0);
    }

    #[tokio::test]
    async fn same_symbol_maps_to_same_lane() {
        let store = Arc::new(InMemoryBarStore::new());
        let sink = Arc::new(PersistenceSink::new(store));
        let cancel = CancellationToken::new();
        let config = LaneConfig {
            lanes: 4,
            ..LaneConfig::default()
        };

        let (lanes, _handles) = PersistenceLanes::spawn(sink, &config, &cancel);

        assert_eq!(lanes.lane_count(), 4);
        assert_eq!(lanes.lane_for("AAPL"), lanes.lane_for("AAPL"));
        assert!(lanes.lane_for("TSLA") < 4);
        cancel.cancel();
    }

    #[tokio::test]
    async fn lanes_write_bars_in_order() {
        let store = Arc::new(InMemoryBarStore::new());
        let sink = Arc::new(PersistenceSink::new(store.clone()));
        let cancel = CancellationToken::new();

        let (lanes, handles) = PersistenceLanes::spawn(sink, &LaneConfig::default(), &cancel);
        for i in 0..5 {
            lanes
                .submit(bar("AAPL", 1_700_000_000_000 + i * 60_000))
                .await
                .unwrap();
        }
        drop(lanes);
        for handle in handles {
            handle.await.unwrap();
        }

        let rows = store.bars_for("AAPL");
        assert_eq!(rows.len(), 5);
        assert!(rows.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn store_failure_does_not_stop_lane() {
        let store = Arc::new(InMemoryBarStore::new());
        let sink = Arc::new(PersistenceSink::new(store.clone()));
        let cancel = CancellationToken::new();
        let config = LaneConfig {
            lanes: 1,
            ..LaneConfig::default()
        };

        let (lanes, handles) = PersistenceLanes::spawn(sink, &config, &cancel);
        store.set_fail_inserts(true);
        lanes.submit(bar("AAPL", 1_700_000_000_000)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.set_fail_inserts(false);
        lanes.submit(bar("AAPL", 1_700_000_060_000)).await.unwrap();
        drop(lanes);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.bar_count(), 1);
    }

    /// Store whose inserts block until released.
    struct GatedStore {
        inner: InMemoryBarStore,
        gate: tokio::sync::Semaphore,
    }

    #[async_trait]
    impl BarStore for GatedStore {
        async fn lookup_asset_by_symbol(
            &self,
            symbol: &str,
        ) -> Result<Option<AssetRef>, StoreError> {
            self.inner.lookup_asset_by_symbol(symbol).await
        }

        async fn create_asset(
            &self,
            symbol: &str,
            name: &str,
            asset_type: AssetType,
        ) -> Result<AssetRef, StoreError> {
            self.inner.create_asset(symbol, name, asset_type).await
        }

        async fn insert_bar(&self, row: &BarRow) -> Result<BarWrite, StoreError> {
            let _permit = self.gate.acquire().await.unwrap();
            self.inner.insert_bar(row).await
        }

        async fn delete_bars_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
            self.inner.delete_bars_before(cutoff).await
        }
    }

    #[tokio::test]
    async fn full_lane_drops_after_timeout() {
        let store = Arc::new(GatedStore {
            inner: InMemoryBarStore::new(),
            gate: tokio::sync::Semaphore::new(0),
        });
        let sink = Arc::new(PersistenceSink::new(store.clone()));
        let cancel = CancellationToken::new();
        let config = LaneConfig {
            lanes: 1,
            capacity: 1,
            enqueue_timeout: Duration::from_millis(20),
        };

        let (lanes, _handles) = PersistenceLanes::spawn(sink, &config, &cancel);
        // First bar parks the writer inside insert_bar, second fills the queue.
        lanes.submit(bar("AAPL", 1_700_000_000_000)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        lanes.submit(bar("AAPL", 1_700_000_060_000)).await.unwrap();

        let started = Instant::now();
        let third = lanes.submit(bar("AAPL", 1_700_000_120_000)).await;

        assert_eq!(third, Err(EnqueueError::Timeout));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(lanes.is_saturated(0));

        store.gate.add_permits(10);
        cancel.cancel();
    }

    #[tokio::test]
    async fn saturated_lane_sheds_without_waiting_then_recovers() {
        let store = Arc::new(GatedStore {
            inner: InMemoryBarStore::new(),
            gate: tokio::sync::Semaphore::new(0),
        });
        let sink = Arc::new(PersistenceSink::new(store.clone()));
        let cancel = CancellationToken::new();
        let config = LaneConfig {
            lanes: 1,
            capacity: 1,
            enqueue_timeout: Duration::from_millis(100),
        };

        let (lanes, _handles) = PersistenceLanes::spawn(sink, &config, &cancel);
        lanes.submit(bar("AAPL", 1_700_000_000_000)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = Instant::now();
        let mut results = Vec::new();
        for i in 1..=12 {
            results.push(lanes.submit(bar("AAPL", 1_700_000_000_000 + i * 60_000)).await);
        }
        let elapsed = started.elapsed();

        // One bar fills the queue, one waits out the timeout, the rest are shed.
        assert_eq!(results[0], Ok(()));
        assert_eq!(results[1], Err(EnqueueError::Timeout));
        assert!(results[2..].iter().all(|r| *r == Err(EnqueueError::Full)));
        assert!(elapsed < Duration::from_millis(400), "took {elapsed:?}");
        assert!(lanes.is_saturated(0));

        store.gate.add_permits(100);
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.inner.bar_count() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        lanes
            .submit(bar("AAPL", 1_700_001_000_000))
            .await
            .unwrap();
        assert!(!lanes.is_saturated(0));
        cancel.cancel();
    }

    #[tokio::test]
    async fn submit_after_writers_stop_is_closed() {
        let store = Arc::new(InMemoryBarStore::new());
        let sink = Arc::new(PersistenceSink::new(store));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (lanes, handles) = PersistenceLanes::spawn(sink, &LaneConfig::default(), &cancel);
        for handle in handles {
            handle.await.unwrap();
        }

        let result = lanes.submit(bar("AAPL", 1_700_000_000_000)).await;
        assert_eq!(result, Err(EnqueueError::Closed));
    }
}
