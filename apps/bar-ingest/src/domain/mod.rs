//! Domain Layer - Core ingestion types and business rules.
//!
//! This layer contains the canonical internal representation of aggregate
//! bars, assets and enrichment work, plus the subscription registry. Nothing
//! here knows about WebSockets, HTTP or SQL.

/// Aggregate bars, asset references and enrichment records.
pub mod market_data;

/// Subscription registry.
pub mod subscription;
