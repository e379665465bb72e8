//! Configuration Module
//!
//! Environment-driven configuration for the ingest service.

mod settings;

pub use settings::{
    ApiKeys, ConfigError, DatabaseSettings, FeedSettings, IngestConfig, PipelineSettings,
    RestSettings, RetentionSettings, ServerSettings,
};
