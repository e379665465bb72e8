//! Ingest Configuration Settings
//!
//! Configuration types for the ingest service, loaded from environment
//! variables. Unparseable optional values fall back to their defaults.

use std::str::FromStr;
use std::time::Duration;

use crate::application::services::{EnrichmentConfig, LaneConfig};
use crate::infrastructure::polygon::{
    Credentials, FeedConfig, HeartbeatConfig, ReconnectConfig, RestClientConfig,
};
use crate::infrastructure::retention::RetentionConfig;

/// Polygon API keys.
#[derive(Clone)]
pub struct ApiKeys {
    feed_key: String,
    rest_key: String,
}

impl ApiKeys {
    /// Create keys. The REST key defaults to the feed key.
    #[must_use]
    pub fn new(feed_key: String, rest_key: Option<String>) -> Self {
        let rest_key = rest_key.unwrap_or_else(|| feed_key.clone());
        Self { feed_key, rest_key }
    }

    /// Key used to authenticate the WebSocket feed.
    #[must_use]
    pub fn feed_key(&self) -> &str {
        &self.feed_key
    }

    /// Key used for REST lookups.
    #[must_use]
    pub fn rest_key(&self) -> &str {
        &self.rest_key
    }
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("feed_key", &"[REDACTED]")
            .field("rest_key", &"[REDACTED]")
            .finish()
    }
}

/// WebSocket feed settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Stream URL.
    pub url: String,
    /// Aggregate channel prefix (`A` per-second, `AM` per-minute).
    pub channel: String,
    /// Socket open timeout.
    pub connect_timeout: Duration,
    /// Auth acknowledgment timeout.
    pub auth_timeout: Duration,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Silence before the connection is considered dead.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum consecutive failed attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: FeedConfig::DELAYED_STOCKS_URL.to_string(),
            channel: "A".to_string(),
            connect_timeout: Duration::from_secs(10),
            auth_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(20),
            heartbeat_timeout: Duration::from_secs(60),
            reconnect_delay_initial: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(60),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0,
        }
    }
}

/// Reference-data REST settings.
#[derive(Debug, Clone)]
pub struct RestSettings {
    /// API base URL.
    pub base_url: String,
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            base_url: RestClientConfig::DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Database settings.
#[derive(Clone)]
pub struct DatabaseSettings {
    /// Connection URL. `None` selects the in-memory store.
    pub url: Option<String>,
    /// Pool size.
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("url", &self.url.as_ref().map(|_| "[REDACTED]"))
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Persistence lane and enrichment pool sizing.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Number of persistence lanes.
    pub persist_lanes: usize,
    /// Queue depth per lane.
    pub persist_lane_capacity: usize,
    /// Maximum wait for lane capacity before a bar is dropped.
    pub persist_enqueue_timeout: Duration,
    /// Enrichment queue capacity.
    pub enrichment_capacity: usize,
    /// Enrichment worker count.
    pub enrichment_workers: usize,
    /// Upper bound on one reference-data lookup.
    pub lookup_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let lanes = LaneConfig::default();
        let enrichment = EnrichmentConfig::default();
        Self {
            persist_lanes: lanes.lanes,
            persist_lane_capacity: lanes.capacity,
            persist_enqueue_timeout: lanes.enqueue_timeout,
            enrichment_capacity: enrichment.capacity,
            enrichment_workers: enrichment.workers,
            lookup_timeout: enrichment.lookup_timeout,
        }
    }
}

/// Retention settings.
#[derive(Debug, Clone)]
pub struct RetentionSettings {
    /// Days of bars to keep (0 = keep forever).
    pub days: u32,
    /// Time between sweeps.
    pub interval: Duration,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            days: 30,
            interval: Duration::from_secs(86_400),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health and admin HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete ingest configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// API keys.
    pub keys: ApiKeys,
    /// Feed connection settings.
    pub feed: FeedSettings,
    /// REST settings.
    pub rest: RestSettings,
    /// Database settings.
    pub database: DatabaseSettings,
    /// Pipeline sizing.
    pub pipeline: PipelineSettings,
    /// Retention settings.
    pub retention: RetentionSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Symbols subscribed at startup.
    pub initial_symbols: Vec<String>,
}

impl IngestConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or
    /// a URL has the wrong scheme.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let feed_key = match vars.raw("POLYGON_API_KEY") {
            None => return Err(ConfigError::MissingEnvVar("POLYGON_API_KEY".to_string())),
            Some(v) if v.trim().is_empty() => {
                return Err(ConfigError::EmptyValue("POLYGON_API_KEY".to_string()));
            }
            Some(v) => v,
        };
        let keys = ApiKeys::new(feed_key, vars.get("POLYGON_REST_API_KEY"));

        let defaults = FeedSettings::default();
        let feed = FeedSettings {
            url: vars.get("POLYGON_FEED_URL").unwrap_or(defaults.url),
            channel: vars
                .get("POLYGON_CHANNEL")
                .map_or(defaults.channel, |c| c.trim().to_uppercase()),
            connect_timeout: vars.secs_or("INGEST_CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
            auth_timeout: vars.secs_or("INGEST_AUTH_TIMEOUT_SECS", defaults.auth_timeout),
            heartbeat_interval: vars
                .secs_or("INGEST_HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval),
            heartbeat_timeout: vars
                .secs_or("INGEST_HEARTBEAT_TIMEOUT_SECS", defaults.heartbeat_timeout),
            reconnect_delay_initial: vars.millis_or(
                "INGEST_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: vars
                .secs_or("INGEST_RECONNECT_DELAY_MAX_SECS", defaults.reconnect_delay_max),
            reconnect_delay_multiplier: vars.parse_or(
                "INGEST_RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: vars
                .parse_or("INGEST_MAX_RECONNECT_ATTEMPTS", defaults.max_reconnect_attempts),
        };
        if !(feed.url.starts_with("ws://") || feed.url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                key: "POLYGON_FEED_URL".to_string(),
                message: "expected a ws:// or wss:// URL".to_string(),
            });
        }

        let rest = RestSettings {
            base_url: vars
                .get("POLYGON_REST_URL")
                .unwrap_or_else(|| RestSettings::default().base_url),
        };
        if !(rest.base_url.starts_with("http://") || rest.base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "POLYGON_REST_URL".to_string(),
                message: "expected an http:// or https:// URL".to_string(),
            });
        }

        let database = DatabaseSettings {
            url: vars.get("DATABASE_URL"),
            max_connections: vars.parse_or(
                "DATABASE_MAX_CONNECTIONS",
                DatabaseSettings::default().max_connections,
            ),
        };

        let defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            persist_lanes: vars.parse_or("INGEST_PERSIST_LANES", defaults.persist_lanes),
            persist_lane_capacity: vars
                .parse_or("INGEST_PERSIST_LANE_CAPACITY", defaults.persist_lane_capacity),
            persist_enqueue_timeout: vars.millis_or(
                "INGEST_PERSIST_ENQUEUE_TIMEOUT_MS",
                defaults.persist_enqueue_timeout,
            ),
            enrichment_capacity: vars
                .parse_or("INGEST_ENRICHMENT_CAPACITY", defaults.enrichment_capacity),
            enrichment_workers: vars
                .parse_or("INGEST_ENRICHMENT_WORKERS", defaults.enrichment_workers),
            lookup_timeout: vars.secs_or("INGEST_LOOKUP_TIMEOUT_SECS", defaults.lookup_timeout),
        };

        let defaults = RetentionSettings::default();
        let retention = RetentionSettings {
            days: vars.parse_or("INGEST_RETENTION_DAYS", defaults.days),
            interval: vars.secs_or("INGEST_RETENTION_INTERVAL_SECS", defaults.interval),
        };

        let server = ServerSettings {
            health_port: vars.parse_or("INGEST_HEALTH_PORT", ServerSettings::default().health_port),
        };

        let initial_symbols = vars
            .get("INGEST_SYMBOLS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            keys,
            feed,
            rest,
            database,
            pipeline,
            retention,
            server,
            initial_symbols,
        })
    }

    /// Feed connection configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the feed key is rejected locally.
    pub fn feed_config(&self) -> Result<FeedConfig, ConfigError> {
        let credentials =
            Credentials::new(self.keys.feed_key()).map_err(|e| ConfigError::InvalidValue {
                key: "POLYGON_API_KEY".to_string(),
                message: e.to_string(),
            })?;

        let mut config = FeedConfig::new(self.feed.url.clone(), credentials);
        config.channel.clone_from(&self.feed.channel);
        config.connect_timeout = self.feed.connect_timeout;
        config.auth_timeout = self.feed.auth_timeout;
        config.heartbeat = HeartbeatConfig {
            ping_interval: self.feed.heartbeat_interval,
            timeout: self.feed.heartbeat_timeout,
        };
        config.reconnect = ReconnectConfig {
            initial_delay: self.feed.reconnect_delay_initial,
            max_delay: self.feed.reconnect_delay_max,
            multiplier: self.feed.reconnect_delay_multiplier,
            max_attempts: self.feed.max_reconnect_attempts,
            ..ReconnectConfig::default()
        };
        Ok(config)
    }

    /// REST client configuration.
    #[must_use]
    pub fn rest_client_config(&self) -> RestClientConfig {
        RestClientConfig {
            base_url: self.rest.base_url.clone(),
            api_key: self.keys.rest_key().to_string(),
            timeout: self.pipeline.lookup_timeout,
        }
    }

    /// Persistence lane configuration.
    #[must_use]
    pub const fn lane_config(&self) -> LaneConfig {
        LaneConfig {
            lanes: self.pipeline.persist_lanes,
            capacity: self.pipeline.persist_lane_capacity,
            enqueue_timeout: self.pipeline.persist_enqueue_timeout,
        }
    }

    /// Enrichment pool configuration.
    #[must_use]
    pub const fn enrichment_config(&self) -> EnrichmentConfig {
        EnrichmentConfig {
            capacity: self.pipeline.enrichment_capacity,
            workers: self.pipeline.enrichment_workers,
            lookup_timeout: self.pipeline.lookup_timeout,
        }
    }

    /// Retention configuration, or `None` when disabled.
    #[must_use]
    pub fn retention_config(&self) -> Option<RetentionConfig> {
        RetentionConfig::from_days(self.retention.days, self.retention.interval)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unusable value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        message: String,
    },
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    /// Non-blank value for `key`.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Positive count for `key`; zero is treated like an unparseable value.
    fn positive(&self, key: &str) -> Option<u64> {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|&n| n > 0)
    }

    fn secs_or(&self, key: &str, default: Duration) -> Duration {
        self.positive(key).map_or(default, Duration::from_secs)
    }

    fn millis_or(&self, key: &str, default: Duration) -> Duration {
        self.positive(key).map_or(default, Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<IngestConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        IngestConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn missing_api_key_is_error() {
        assert!(matches!(config(&[]), Err(ConfigError::MissingEnvVar(k)) if k == "POLYGON_API_KEY"));
    }

    #[test]
    fn blank_api_key_is_error() {
        assert!(matches!(
            config(&[("POLYGON_API_KEY", "  ")]),
            Err(ConfigError::EmptyValue(_))
        ));
    }

    #[test]
    fn defaults_applied() {
        let config = config(&[("POLYGON_API_KEY", "key")]).unwrap();

        assert_eq!(config.feed.url, "wss://delayed.polygon.io/stocks");
        assert_eq!(config.feed.channel, "A");
        assert_eq!(config.rest.base_url, "https://api.polygon.io");
        assert_eq!(config.keys.rest_key(), "key");
        assert!(config.database.url.is_none());
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.pipeline.persist_lanes, 4);
        assert_eq!(config.pipeline.persist_lane_capacity, 1024);
        assert_eq!(
            config.pipeline.persist_enqueue_timeout,
            Duration::from_secs(2)
        );
        assert_eq!(config.pipeline.enrichment_capacity, 256);
        assert_eq!(config.pipeline.enrichment_workers, 4);
        assert_eq!(config.retention.days, 30);
        assert_eq!(config.server.health_port, 8083);
        assert_eq!(config.feed.max_reconnect_attempts, 0);
        assert!(config.initial_symbols.is_empty());
    }

    #[test]
    fn overrides_applied() {
        let config = config(&[
            ("POLYGON_API_KEY", "feed"),
            ("POLYGON_REST_API_KEY", "rest"),
            ("POLYGON_FEED_URL", "ws://127.0.0.1:9000/stocks"),
            ("POLYGON_CHANNEL", "am"),
            ("DATABASE_URL", "postgres://localhost/bars"),
            ("INGEST_SYMBOLS", "aapl, MSFT,,tsla "),
            ("INGEST_PERSIST_LANES", "8"),
            ("INGEST_PERSIST_ENQUEUE_TIMEOUT_MS", "250"),
            ("INGEST_RECONNECT_DELAY_MULTIPLIER", "1.5"),
            ("INGEST_MAX_RECONNECT_ATTEMPTS", "3"),
            ("INGEST_RETENTION_DAYS", "0"),
        ])
        .unwrap();

        assert_eq!(config.keys.rest_key(), "rest");
        assert_eq!(config.feed.channel, "AM");
        assert_eq!(config.initial_symbols, vec!["aapl", "MSFT", "tsla"]);
        assert_eq!(config.lane_config().lanes, 8);
        assert_eq!(
            config.lane_config().enqueue_timeout,
            Duration::from_millis(250)
        );
        assert!(config.retention_config().is_none());

        let feed = config.feed_config().unwrap();
        assert_eq!(feed.url, "ws://127.0.0.1:9000/stocks");
        assert_eq!(feed.reconnect.max_attempts, 3);
        assert!((feed.reconnect.multiplier - 1.5).abs() < f64::EPSILON);
        assert_eq!(feed.credentials.api_key(), "feed");
    }

    #[test]
    fn unparseable_values_fall_back_to_defaults() {
        let config = config(&[
            ("POLYGON_API_KEY", "key"),
            ("INGEST_HEALTH_PORT", "not-a-port"),
            ("INGEST_ENRICHMENT_WORKERS", "-1"),
        ])
        .unwrap();

        assert_eq!(config.server.health_port, 8083);
        assert_eq!(config.pipeline.enrichment_workers, 4);
    }

    #[test]
    fn zero_durations_fall_back_to_defaults() {
        let config = config(&[
            ("POLYGON_API_KEY", "key"),
            ("INGEST_HEARTBEAT_INTERVAL_SECS", "0"),
            ("INGEST_HEARTBEAT_TIMEOUT_SECS", "0"),
            ("INGEST_RETENTION_INTERVAL_SECS", "0"),
            ("INGEST_PERSIST_ENQUEUE_TIMEOUT_MS", "0"),
            ("INGEST_LOOKUP_TIMEOUT_SECS", "0"),
        ])
        .unwrap();

        let feed = config.feed_config().unwrap();
        assert_eq!(feed.heartbeat.ping_interval, Duration::from_secs(20));
        assert_eq!(feed.heartbeat.timeout, Duration::from_secs(60));
        assert_eq!(
            config.pipeline.persist_enqueue_timeout,
            Duration::from_secs(2)
        );
        assert!(config.pipeline.lookup_timeout > Duration::ZERO);
        let retention = config.retention_config().unwrap();
        assert_eq!(retention.interval, Duration::from_secs(86_400));
    }

    #[test]
    fn wrong_feed_scheme_is_rejected() {
        let err = config(&[
            ("POLYGON_API_KEY", "key"),
            ("POLYGON_FEED_URL", "https://delayed.polygon.io/stocks"),
        ])
        .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "POLYGON_FEED_URL"));
    }

    #[test]
    fn secrets_redacted_in_debug() {
        let config = config(&[
            ("POLYGON_API_KEY", "feed-secret"),
            ("DATABASE_URL", "postgres://user:pw@db/bars"),
        ])
        .unwrap();

        let debug = format!("{config:?}");
        assert!(!debug.contains("feed-secret"));
        assert!(!debug.contains("pw@db"));
        assert!(debug.contains("[REDACTED]"));
    }
}
