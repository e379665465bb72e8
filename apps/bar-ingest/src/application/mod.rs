//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the pipeline services (persistence, enrichment) and
//! the port interfaces they use to reach storage and reference data.

/// Port interfaces for external systems (bar storage, symbol lookup).
pub mod ports;

/// Application services for persistence and enrichment.
pub mod services;
