//! Bar Ingest Binary
//!
//! Starts the aggregate bar ingestion pipeline.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin bar-ingest
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `POLYGON_API_KEY`: Polygon API key
//!
//! ## Optional
//! - `POLYGON_REST_API_KEY`: Key for reference-data lookups (default: feed key)
//! - `POLYGON_FEED_URL`: Stream URL (default: `wss://delayed.polygon.io/stocks`)
//! - `POLYGON_REST_URL`: REST base URL (default: <https://api.polygon.io>)
//! - `POLYGON_CHANNEL`: Aggregate channel, `A` or `AM` (default: A)
//! - `DATABASE_URL`: Postgres URL (default: in-memory store)
//! - `INGEST_SYMBOLS`: Comma-separated symbols subscribed at startup
//! - `INGEST_HEALTH_PORT`: Health and admin HTTP port (default: 8083)
//! - `INGEST_RETENTION_DAYS`: Days of bars to keep, 0 disables (default: 30)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: bar-ingest)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use bar_ingest::infrastructure::health::{HealthServer, HealthServerState};
use bar_ingest::infrastructure::telemetry;
use bar_ingest::{
    BarStore, EnrichmentQueue, EnrichmentWorkers, FeedSupervisor, FrameDispatcher,
    InMemoryBarStore, IngestConfig, PersistenceLanes, PersistenceSink, PgBarStore,
    PolygonRestClient, RetentionJob, SubscriptionRegistry, init_metrics,
};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Bar Ingest");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = IngestConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Storage
    let store = open_store(&config).await?;

    // Persistence lanes
    let sink = Arc::new(PersistenceSink::new(Arc::clone(&store)));
    let (lanes, lane_handles) =
        PersistenceLanes::spawn(sink, &config.lane_config(), &shutdown_token);

    // Enrichment queue and workers
    let enrichment_config = config.enrichment_config();
    let (enrichment_queue, enrichment_rx) = EnrichmentQueue::new(enrichment_config.capacity);
    let enrichment_queue = Arc::new(enrichment_queue);
    let lookup = Arc::new(PolygonRestClient::new(&config.rest_client_config())?);
    let enrichment_workers =
        EnrichmentWorkers::spawn(enrichment_rx, lookup, &enrichment_config, &shutdown_token);

    // Feed supervisor
    let registry = Arc::new(SubscriptionRegistry::with_symbols(&config.initial_symbols));
    let dispatcher = Arc::new(FrameDispatcher::new(lanes, Arc::clone(&enrichment_queue)));
    let supervisor = Arc::new(FeedSupervisor::new(
        config.feed_config()?,
        registry,
        dispatcher,
        shutdown_token.clone(),
    ));
    supervisor.connect();

    // Retention
    let retention_handle = config.retention_config().map(|retention| {
        let job = RetentionJob::new(Arc::clone(&store), retention);
        tokio::spawn(job.run(shutdown_token.clone()))
    });
    if retention_handle.is_none() {
        tracing::info!("Retention disabled");
    }

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&supervisor),
        Arc::clone(&enrichment_queue),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Bar ingest ready");

    await_shutdown(shutdown_token).await;

    supervisor.shutdown().await;
    enrichment_queue.close();

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        enrichment_workers.join().await;
        join_all(lane_handles).await;
        if let Some(handle) = retention_handle {
            let _ = handle.await;
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out with tasks still running"
        );
    }

    tracing::info!("Bar ingest stopped");
    Ok(())
}

/// Open the configured store, falling back to memory without `DATABASE_URL`.
async fn open_store(config: &IngestConfig) -> Result<Arc<dyn BarStore>, bar_ingest::StoreError> {
    match &config.database.url {
        Some(url) => {
            let store = PgBarStore::connect(url, config.database.max_connections).await?;
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, bars are kept in memory only");
            Ok(Arc::new(InMemoryBarStore::new()))
        }
    }
}

async fn join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Task panicked during shutdown");
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &IngestConfig) {
    tracing::info!(
        feed_url = %config.feed.url,
        channel = %config.feed.channel,
        symbols = config.initial_symbols.len(),
        database = config.database.url.is_some(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        persist_lanes = config.pipeline.persist_lanes,
        persist_lane_capacity = config.pipeline.persist_lane_capacity,
        enrichment_capacity = config.pipeline.enrichment_capacity,
        enrichment_workers = config.pipeline.enrichment_workers,
        retention_days = config.retention.days,
        "Pipeline sizing"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
