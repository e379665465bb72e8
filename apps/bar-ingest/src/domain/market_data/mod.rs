//! Market Data Types
//!
//! Codec-agnostic representations of what flows through the pipeline:
//! aggregate bars as received from the feed, the persisted row shape,
//! asset references, and the enrichment records produced for newly seen
//! symbols.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::subscription::Symbol;

// =============================================================================
// Aggregate Bars
// =============================================================================

/// One OHLCV aggregate for a symbol over a short interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateBar {
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Period start, epoch milliseconds (UTC).
    pub period_start_ms: i64,
    /// Period end, epoch milliseconds (UTC), when provided by the feed.
    pub period_end_ms: Option<i64>,
    /// Opening price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Volume traded within the period.
    pub volume: Decimal,
    /// Volume-weighted average price, when provided.
    pub vwap: Option<Decimal>,
}

impl AggregateBar {
    /// Period start as a UTC timestamp.
    ///
    /// Returns `None` when the millisecond value is outside chrono's range.
    #[must_use]
    pub fn period_start(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.period_start_ms)
    }
}

/// Database-generated asset identifier.
pub type AssetId = i64;

/// A bar as persisted, keyed by `(asset_id, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarRow {
    /// Owning asset.
    pub asset_id: AssetId,
    /// Period start (UTC).
    pub timestamp: DateTime<Utc>,
    /// Opening price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Volume.
    pub volume: Decimal,
}

impl BarRow {
    /// Build the persisted row for a bar belonging to `asset_id`.
    #[must_use]
    pub fn from_bar(asset_id: AssetId, timestamp: DateTime<Utc>, bar: &AggregateBar) -> Self {
        Self {
            asset_id,
            timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }
}

// =============================================================================
// Assets
// =============================================================================

/// Broad asset class recorded alongside each asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    /// Common stock. Default for assets auto-created from the feed.
    #[default]
    Stock,
    /// Exchange-traded fund.
    Etf,
    /// Index.
    Index,
    /// Anything else.
    Other,
}

impl AssetType {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Etf => "etf",
            Self::Index => "index",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = std::convert::Infallible;

    /// Unknown values map to [`AssetType::Other`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "stock" | "cs" => Self::Stock,
            "etf" => Self::Etf,
            "index" => Self::Index,
            _ => Self::Other,
        })
    }
}

/// Persistent asset record. One per symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    /// Database identifier.
    pub asset_id: AssetId,
    /// Unique ticker symbol.
    pub symbol: Symbol,
    /// Display name; defaults to the symbol for auto-created assets.
    pub name: String,
    /// Asset class.
    pub asset_type: AssetType,
}

// =============================================================================
// Enrichment
// =============================================================================

/// A unit of deferred reference-data lookup work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentTask {
    /// Symbol to look up.
    pub symbol: Symbol,
    /// When the task was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl EnrichmentTask {
    /// Create a task stamped with the current time.
    #[must_use]
    pub fn new(symbol: impl Into<Symbol>) -> Self {
        Self {
            symbol: symbol.into(),
            enqueued_at: Utc::now(),
        }
    }
}

/// Reference metadata returned by the symbol details lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDetails {
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Company or instrument name.
    pub name: Option<String>,
    /// Market, e.g. `stocks`.
    pub market: Option<String>,
    /// Locale, e.g. `us`.
    pub locale: Option<String>,
    /// Provider type code, e.g. `CS`.
    pub type_code: Option<String>,
    /// Whether the instrument is actively traded.
    pub active: Option<bool>,
    /// Currency name, e.g. `usd`.
    pub currency: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn bar(period_start_ms: i64) -> AggregateBar {
        AggregateBar {
            symbol: "AAPL".to_string(),
            period_start_ms,
            period_end_ms: period_start_ms.checked_add(60_000),
            open: Decimal::new(1500, 1),
            high: Decimal::new(1510, 1),
            low: Decimal::new(1495, 1),
            close: Decimal::new(1505, 1),
            volume: Decimal::from(1_000_000),
            vwap: None,
        }
    }

    #[test]
    fn period_start_converts_epoch_millis() {
        let ts = bar(1_700_000_000_000).period_start().unwrap();
        assert_eq!(ts.to_rfc3339(), "2023-11-14T22:13:20+00:00");
    }

    #[test]
    fn period_start_out_of_range_is_none() {
        assert!(bar(i64::MAX).period_start().is_none());
    }

    #[test]
    fn bar_row_copies_ohlcv() {
        let b = bar(1_700_000_000_000);
        let ts = b.period_start().unwrap();
        let row = BarRow::from_bar(7, ts, &b);

        assert_eq!(row.asset_id, 7);
        assert_eq!(row.timestamp, ts);
        assert_eq!(row.close, Decimal::new(1505, 1)); // 150.5
        assert_eq!(row.volume, Decimal::from(1_000_000));
    }

    #[test_case("stock", AssetType::Stock)]
    #[test_case("CS", AssetType::Stock)]
    #[test_case("ETF", AssetType::Etf)]
    #[test_case(" index ", AssetType::Index)]
    #[test_case("warrant", AssetType::Other)]
    fn asset_type_parses_leniently(raw: &str, expected: AssetType) {
        assert_eq!(raw.parse::<AssetType>().unwrap(), expected);
    }

    #[test]
    fn asset_type_defaults_to_stock() {
        assert_eq!(AssetType::default().as_str(), "stock");
    }

    #[test]
    fn enrichment_task_keeps_symbol() {
        let task = EnrichmentTask::new("AAPL");
        assert_eq!(task.symbol, "AAPL");
        assert!(task.enqueued_at <= Utc::now());
    }
}
