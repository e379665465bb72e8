//! Bar Store Port (Driven Port)
//!
//! Interface for persisting assets and aggregate bars.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::market_data::{AssetRef, AssetType, BarRow};

/// Outcome of a bar insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarWrite {
    /// A new row was written.
    Inserted,
    /// A row with the same `(asset_id, timestamp)` already existed.
    Duplicate,
}

/// Bar store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Another writer created the asset first.
    #[error("Asset already exists: {symbol}")]
    Conflict {
        /// Conflicting symbol.
        symbol: String,
    },

    /// Connection or pool error.
    #[error("Store connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// Query failed.
    #[error("Store query error: {message}")]
    Query {
        /// Error details.
        message: String,
    },

    /// A stored row could not be decoded.
    #[error("Invalid stored row: {message}")]
    InvalidRow {
        /// Error details.
        message: String,
    },
}

/// Port for asset and bar persistence.
///
/// Implementations must enforce one asset per symbol and at most one bar per
/// `(asset_id, timestamp)`.
#[async_trait]
pub trait BarStore: Send + Sync {
    /// Find an asset by its exact symbol.
    async fn lookup_asset_by_symbol(&self, symbol: &str) -> Result<Option<AssetRef>, StoreError>;

    /// Create an asset.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the symbol already exists.
    async fn create_asset(
        &self,
        symbol: &str,
        name: &str,
        asset_type: AssetType,
    ) -> Result<AssetRef, StoreError>;

    /// Insert a bar. Duplicates are reported, not treated as errors.
    async fn insert_bar(&self, row: &BarRow) -> Result<BarWrite, StoreError>;

    /// Delete all bars with a timestamp strictly before `cutoff`.
    ///
    /// Returns the number of rows removed.
    async fn delete_bars_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
