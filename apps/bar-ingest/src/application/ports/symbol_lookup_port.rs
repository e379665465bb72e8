//! Symbol Lookup Port (Driven Port)
//!
//! Interface for fetching reference metadata about a ticker.

use async_trait::async_trait;

use crate::domain::market_data::SymbolDetails;

/// Symbol lookup error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LookupError {
    /// The provider has no record of the symbol.
    #[error("Symbol not found: {symbol}")]
    NotFound {
        /// The missing symbol.
        symbol: String,
    },

    /// Non-success HTTP status.
    #[error("Lookup failed with status {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Network or transport failure.
    #[error("Lookup network error: {message}")]
    Network {
        /// Error details.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Lookup decode error: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// The lookup did not complete in time.
    #[error("Lookup timed out")]
    Timeout,
}

impl LookupError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Http { .. } => "http",
            Self::Network { .. } => "network",
            Self::Decode { .. } => "decode",
            Self::Timeout => "timeout",
        }
    }
}

/// Port for reference-data lookups.
#[async_trait]
pub trait SymbolDetailsLookup: Send + Sync {
    /// Fetch details for a single symbol.
    async fn fetch_symbol_details(&self, symbol: &str) -> Result<SymbolDetails, LookupError>;
}
