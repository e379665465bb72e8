//! Postgres Bar Store
//!
//! `assets` holds one row per symbol; `market_data` holds one row per
//! `(asset_id, timestamp)`. Both writes use `ON CONFLICT DO NOTHING`, so a
//! redelivered bar or a lost asset-creation race is reported instead of
//! raising a constraint error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;

use crate::application::ports::{BarStore, BarWrite, StoreError};
use crate::domain::market_data::{AssetRef, AssetType, BarRow};

const CREATE_ASSETS: &str = r"
    CREATE TABLE IF NOT EXISTS assets (
        asset_id    BIGSERIAL PRIMARY KEY,
        symbol      TEXT NOT NULL UNIQUE,
        name        TEXT NOT NULL,
        asset_type  TEXT NOT NULL DEFAULT 'stock'
    )
";

const CREATE_MARKET_DATA: &str = r"
    CREATE TABLE IF NOT EXISTS market_data (
        asset_id    BIGINT NOT NULL REFERENCES assets (asset_id),
        timestamp   TIMESTAMPTZ NOT NULL,
        open        NUMERIC NOT NULL,
        high        NUMERIC NOT NULL,
        low         NUMERIC NOT NULL,
        close       NUMERIC NOT NULL,
        volume      NUMERIC NOT NULL,
        PRIMARY KEY (asset_id, timestamp)
    )
";

/// Bar store backed by a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgBarStore {
    pool: PgPool,
}

impl PgBarStore {
    /// Connect a pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection {
                message: e.to_string(),
            })?;

        info!(max_connections, "PostgreSQL connection pool initialized");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if either statement fails.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in [CREATE_ASSETS, CREATE_MARKET_DATA] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(store_error)?;
        }
        info!("Database schema ensured");
        Ok(())
    }
}

#[async_trait]
impl BarStore for PgBarStore {
    async fn lookup_asset_by_symbol(&self, symbol: &str) -> Result<Option<AssetRef>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT asset_id, symbol, name, asset_type
            FROM assets
            WHERE symbol = $1
            ",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(|r| {
            let asset_type: String = r.try_get("asset_type").map_err(invalid_row)?;
            Ok(AssetRef {
                asset_id: r.try_get("asset_id").map_err(invalid_row)?,
                symbol: r.try_get("symbol").map_err(invalid_row)?,
                name: r.try_get("name").map_err(invalid_row)?,
                asset_type: asset_type.parse().unwrap_or_default(),
            })
        })
        .transpose()
    }

    async fn create_asset(
        &self,
        symbol: &str,
        name: &str,
        asset_type: AssetType,
    ) -> Result<AssetRef, StoreError> {
        let row = sqlx::query(
            r"
            INSERT INTO assets (symbol, name, asset_type)
            VALUES ($1, $2, $3)
            ON CONFLICT (symbol) DO NOTHING
            RETURNING asset_id
            ",
        )
        .bind(symbol)
        .bind(name)
        .bind(asset_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        let Some(row) = row else {
            return Err(StoreError::Conflict {
                symbol: symbol.to_string(),
            });
        };

        Ok(AssetRef {
            asset_id: row.try_get("asset_id").map_err(invalid_row)?,
            symbol: symbol.to_string(),
            name: name.to_string(),
            asset_type,
        })
    }

    async fn insert_bar(&self, row: &BarRow) -> Result<BarWrite, StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO market_data (asset_id, timestamp, open, high, low, close, volume)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (asset_id, timestamp) DO NOTHING
            ",
        )
        .bind(row.asset_id)
        .bind(row.timestamp)
        .bind(row.open)
        .bind(row.high)
        .bind(row.low)
        .bind(row.close)
        .bind(row.volume)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(if result.rows_affected() == 0 {
            BarWrite::Duplicate
        } else {
            BarWrite::Inserted
        })
    }

    async fn delete_bars_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM market_data WHERE timestamp < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(result.rows_affected())
    }
}

fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Connection {
            message: err.to_string(),
        },
        other => StoreError::Query {
            message: other.to_string(),
        },
    }
}

fn invalid_row(err: sqlx::Error) -> StoreError {
    StoreError::InvalidRow {
        message: err.to_string(),
    }
}
