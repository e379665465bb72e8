//! In-Memory Bar Store

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::application::ports::{BarStore, BarWrite, StoreError};
use crate::domain::market_data::{AssetId, AssetRef, AssetType, BarRow};
use crate::domain::subscription::Symbol;

#[derive(Debug, Default)]
struct Tables {
    assets: HashMap<Symbol, AssetRef>,
    next_asset_id: AssetId,
    bars: BTreeMap<(AssetId, DateTime<Utc>), BarRow>,
}

/// Store backed by in-process maps.
///
/// Enforces one asset per symbol and one bar per `(asset_id, timestamp)`,
/// the same as the `assets` / `market_data` schema.
#[derive(Debug, Default)]
pub struct InMemoryBarStore {
    tables: Mutex<Tables>,
    fail_inserts: AtomicBool,
}

impl InMemoryBarStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asset recorded for `symbol`.
    #[must_use]
    pub fn asset(&self, symbol: &str) -> Option<AssetRef> {
        self.tables.lock().assets.get(symbol).cloned()
    }

    /// Number of assets.
    #[must_use]
    pub fn asset_count(&self) -> usize {
        self.tables.lock().assets.len()
    }

    /// Number of bars.
    #[must_use]
    pub fn bar_count(&self) -> usize {
        self.tables.lock().bars.len()
    }

    /// Bars for `symbol`, oldest first.
    #[must_use]
    pub fn bars_for(&self, symbol: &str) -> Vec<BarRow> {
        let tables = self.tables.lock();
        let Some(asset_id) = tables.assets.get(symbol).map(|a| a.asset_id) else {
            return Vec::new();
        };
        tables
            .bars
            .range((asset_id, DateTime::<Utc>::MIN_UTC)..=(asset_id, DateTime::<Utc>::MAX_UTC))
            .map(|(_, row)| row.clone())
            .collect()
    }

    /// Make subsequent `insert_bar` calls fail with a query error.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BarStore for InMemoryBarStore {
    async fn lookup_asset_by_symbol(&self, symbol: &str) -> Result<Option<AssetRef>, StoreError> {
        Ok(self.asset(symbol))
    }

    async fn create_asset(
        &self,
        symbol: &str,
        name: &str,
        asset_type: AssetType,
    ) -> Result<AssetRef, StoreError> {
        let mut tables = self.tables.lock();
        if tables.assets.contains_key(symbol) {
            return Err(StoreError::Conflict {
                symbol: symbol.to_string(),
            });
        }

        tables.next_asset_id += 1;
        let asset = AssetRef {
            asset_id: tables.next_asset_id,
            symbol: symbol.to_string(),
            name: name.to_string(),
            asset_type,
        };
        tables.assets.insert(symbol.to_string(), asset.clone());
        Ok(asset)
    }

    async fn insert_bar(&self, row: &BarRow) -> Result<BarWrite, StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Query {
                message: "insert failure injected".to_string(),
            });
        }

        let mut tables = self.tables.lock();
        if !tables.assets.values().any(|a| a.asset_id == row.asset_id) {
            return Err(StoreError::Query {
                message: format!("asset {} does not exist", row.asset_id),
            });
        }

        let key = (row.asset_id, row.timestamp);
        if tables.bars.contains_key(&key) {
            return Ok(BarWrite::Duplicate);
        }
        tables.bars.insert(key, row.clone());
        Ok(BarWrite::Inserted)
    }

    async fn delete_bars_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock();
        let before = tables.bars.len();
        tables.bars.retain(|(_, timestamp), _| *timestamp >= cutoff);
        Ok(u64::try_from(before - tables.bars.len()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn row(asset_id: AssetId, minute: u32) -> BarRow {
        BarRow {
            asset_id,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 15, minute, 0).unwrap(),
            open: Decimal::ONE,
            high: Decimal::ONE,
            low: Decimal::ONE,
            close: Decimal::ONE,
            volume: Decimal::from(100),
        }
    }

    #[tokio::test]
    async fn duplicate_symbol_conflicts() {
        let store = InMemoryBarStore::new();
        store
            .create_asset("AAPL", "AAPL", AssetType::Stock)
            .await
            .unwrap();

        let err = store
            .create_asset("AAPL", "Apple", AssetType::Stock)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.asset_count(), 1);
    }

    #[tokio::test]
    async fn asset_ids_are_distinct() {
        let store = InMemoryBarStore::new();
        let a = store.create_asset("A", "A", AssetType::Stock).await.unwrap();
        let b = store.create_asset("B", "B", AssetType::Etf).await.unwrap();

        assert_ne!(a.asset_id, b.asset_id);
        assert_eq!(
            store.lookup_asset_by_symbol("B").await.unwrap(),
            Some(b)
        );
        assert_eq!(store.lookup_asset_by_symbol("C").await.unwrap(), None);
    }

    #[tokio::test]
    async fn bar_for_unknown_asset_is_rejected() {
        let store = InMemoryBarStore::new();
        assert!(store.insert_bar(&row(42, 0)).await.is_err());
    }

    #[tokio::test]
    async fn bars_are_keyed_by_asset_and_timestamp() {
        let store = InMemoryBarStore::new();
        let aapl = store.create_asset("AAPL", "AAPL", AssetType::Stock).await.unwrap();
        let msft = store.create_asset("MSFT", "MSFT", AssetType::Stock).await.unwrap();

        assert_eq!(
            store.insert_bar(&row(aapl.asset_id, 1)).await.unwrap(),
            BarWrite::Inserted
        );
        assert_eq!(
            store.insert_bar(&row(aapl.asset_id, 1)).await.unwrap(),
            BarWrite::Duplicate
        );
        assert_eq!(
            store.insert_bar(&row(msft.asset_id, 1)).await.unwrap(),
            BarWrite::Inserted
        );
        store.insert_bar(&row(aapl.asset_id, 0)).await.unwrap();

        let aapl_bars = store.bars_for("AAPL");
        assert_eq!(aapl_bars.len(), 2);
        assert!(aapl_bars[0].timestamp < aapl_bars[1].timestamp);
        assert_eq!(store.bar_count(), 3);
    }

    #[tokio::test]
    async fn delete_before_cutoff_is_exclusive() {
        let store = InMemoryBarStore::new();
        let asset = store.create_asset("AAPL", "AAPL", AssetType::Stock).await.unwrap();
        for minute in 0..5 {
            store.insert_bar(&row(asset.asset_id, minute)).await.unwrap();
        }

        let cutoff = Utc.with_ymd_and_hms(2024, 1, 2, 15, 2, 0).unwrap();
        let deleted = store.delete_bars_before(cutoff).await.unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(store.bars_for("AAPL")[0].timestamp, cutoff);
    }

    #[tokio::test]
    async fn injected_failures_can_be_cleared() {
        let store = InMemoryBarStore::new();
        let asset = store.create_asset("AAPL", "AAPL", AssetType::Stock).await.unwrap();

        store.set_fail_inserts(true);
        assert!(store.insert_bar(&row(asset.asset_id, 0)).await.is_err());

        store.set_fail_inserts(false);
        assert!(store.insert_bar(&row(asset.asset_id, 0)).await.is_ok());
    }
}
