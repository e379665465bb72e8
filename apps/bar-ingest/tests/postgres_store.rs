//! Postgres Store Integration Tests
//!
//! Require a reachable database:
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/bar_ingest_test cargo test -p bar-ingest -- --ignored
//! ```
//!
//! Each test works on its own symbol so runs against a shared database do
//! not interfere.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use chrono::{TimeDelta, TimeZone, Utc};
use rust_decimal::Decimal;

use bar_ingest::{
    AggregateBar, AssetType, BarRow, BarStore, BarWrite, PersistenceSink, PgBarStore, StoreError,
};

async fn store() -> PgBarStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let store = PgBarStore::connect(&url, 2).await.unwrap();
    store.ensure_schema().await.unwrap();
    store
}

fn unique_symbol(prefix: &str) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{prefix}{}", nanos % 1_000_000_000)
}

fn row(asset_id: i64, minute: i64) -> BarRow {
    BarRow {
        asset_id,
        timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 15, 30, 0).unwrap() + TimeDelta::minutes(minute),
        open: Decimal::new(18_512, 2),
        high: Decimal::new(18_540, 2),
        low: Decimal::new(18_499, 2),
        close: Decimal::new(18_530, 2),
        volume: Decimal::from(12_345),
    }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn asset_create_and_lookup() {
    let store = store().await;
    let symbol = unique_symbol("T");

    assert!(store.lookup_asset_by_symbol(&symbol).await.unwrap().is_none());

    let created = store
        .create_asset(&symbol, &symbol, AssetType::Stock)
        .await
        .unwrap();
    let found = store.lookup_asset_by_symbol(&symbol).await.unwrap().unwrap();
    assert_eq!(found, created);

    let conflict = store
        .create_asset(&symbol, "Other", AssetType::Stock)
        .await
        .unwrap_err();
    assert!(matches!(conflict, StoreError::Conflict { .. }));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn insert_is_idempotent_and_retention_deletes_old_rows() {
    let store = store().await;
    let symbol = unique_symbol("R");
    let asset = store
        .create_asset(&symbol, &symbol, AssetType::Stock)
        .await
        .unwrap();

    assert_eq!(
        store.insert_bar(&row(asset.asset_id, 0)).await.unwrap(),
        BarWrite::Inserted
    );
    assert_eq!(
        store.insert_bar(&row(asset.asset_id, 0)).await.unwrap(),
        BarWrite::Duplicate
    );
    store.insert_bar(&row(asset.asset_id, 1)).await.unwrap();

    // Every row written above is far older than this cutoff.
    let cutoff = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
    let deleted = store.delete_bars_before(cutoff).await.unwrap();
    assert!(deleted >= 2);

    assert_eq!(
        store.insert_bar(&row(asset.asset_id, 0)).await.unwrap(),
        BarWrite::Inserted
    );
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_sinks_converge_on_one_asset() {
    let store: Arc<dyn BarStore> = Arc::new(store().await);
    let symbol = unique_symbol("C");

    let mut handles = Vec::new();
    for i in 0..4_i64 {
        // Separate sinks do not share an asset cache.
        let sink = PersistenceSink::new(Arc::clone(&store));
        let symbol = symbol.clone();
        handles.push(tokio::spawn(async move {
            let bar = AggregateBar {
                symbol,
                period_start_ms: 1_704_209_400_000 + i * 60_000,
                period_end_ms: None,
                open: Decimal::ONE,
                high: Decimal::ONE,
                low: Decimal::ONE,
                close: Decimal::ONE,
                volume: Decimal::from(10),
                vwap: None,
            };
            sink.store(&bar).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), BarWrite::Inserted);
    }

    let asset = store.lookup_asset_by_symbol(&symbol).await.unwrap().unwrap();
    assert_eq!(asset.name, symbol);
}
