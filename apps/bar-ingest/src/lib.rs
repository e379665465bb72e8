#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Bar Ingest - Aggregate Bar Ingestion Pipeline
//!
//! Maintains a single WebSocket connection to the Polygon aggregate feed,
//! keeps its subscriptions in sync with an in-memory registry across
//! reconnects, persists every bar and enriches newly seen symbols through
//! the reference-data REST API without stalling the read loop.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core ingestion types
//!   - `market_data`: Aggregate bars, assets, enrichment records
//!   - `subscription`: Subscription registry
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Bar store and symbol lookup interfaces
//!   - `services`: Persistence lanes, enrichment queue and workers
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `polygon`: Feed supervisor, frame dispatcher, REST client
//!   - `storage`: Postgres and in-memory bar stores
//!   - `retention`: Old bar cleanup
//!   - `config`: Configuration from the environment
//!   - `health`: Health, metrics and subscription admin endpoint
//!
//! # Data Flow
//!
//! ```text
//! Polygon WS ──► Supervisor ──► Dispatcher ──┬──► Persist lanes ──► Store
//!                    ▲                       └──► Enrichment ──► REST lookup
//!                    │ snapshot on (re)connect
//!                Registry ◄── subscribe / unsubscribe
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core ingestion types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market_data::{
    AggregateBar, AssetId, AssetRef, AssetType, BarRow, EnrichmentTask, SymbolDetails,
};
pub use domain::subscription::{SubscriptionRegistry, Symbol, normalize_symbol};

// Ports and services
pub use application::ports::{BarStore, BarWrite, LookupError, StoreError, SymbolDetailsLookup};
pub use application::services::{
    EnqueueError, EnrichmentConfig, EnrichmentQueue, EnrichmentReceiver, EnrichmentWorkers,
    LaneConfig, PersistError, PersistenceLanes, PersistenceSink,
};

// Feed
pub use infrastructure::polygon::{
    ConnectionState, Credentials, FeedConfig, FeedError, FeedSupervisor, FrameDispatcher,
    PolygonRestClient, RestClientConfig,
};

// Storage
pub use infrastructure::storage::{InMemoryBarStore, PgBarStore};

// Retention
pub use infrastructure::retention::{RetentionConfig, RetentionJob};

// Infrastructure config
pub use infrastructure::config::{ConfigError, IngestConfig};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
