//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the feed connection itself.

/// Polygon adapters (WebSocket feed, REST reference data).
pub mod polygon;

/// Bar store adapters (Postgres, in-memory).
pub mod storage;

/// Periodic deletion of old bars.
pub mod retention;

/// Configuration and dependency injection.
pub mod config;

/// Health check and subscription admin HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
