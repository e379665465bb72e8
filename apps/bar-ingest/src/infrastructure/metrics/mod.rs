//! Prometheus Metrics Module
//!
//! Exposes pipeline metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Decoded feed events by kind
//! - **Persistence**: Bar writes by outcome, drops, write latency
//! - **Enrichment**: Queue admissions, drops, lookup outcomes
//! - **Connection**: Feed state, reconnects, errors, subscription count
//! - **Retention**: Rows removed by the retention job
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first call.
///
/// # Panics
///
/// Panics if another global recorder was installed outside this function.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "bar_ingest_frames_received_total",
        "Decoded feed events by kind"
    );

    describe_counter!(
        "bar_ingest_bars_persisted_total",
        "Bar write attempts by outcome"
    );
    describe_counter!(
        "bar_ingest_bars_dropped_total",
        "Bars dropped before reaching the store"
    );
    describe_histogram!(
        "bar_ingest_persist_duration_seconds",
        "Time to resolve the asset and write one bar"
    );

    describe_counter!(
        "bar_ingest_enrichment_enqueued_total",
        "Enrichment tasks admitted to the queue"
    );
    describe_counter!(
        "bar_ingest_enrichment_dropped_total",
        "Enrichment tasks rejected at enqueue"
    );
    describe_counter!(
        "bar_ingest_enrichment_completed_total",
        "Enrichment lookups by outcome"
    );

    describe_gauge!(
        "bar_ingest_feed_live",
        "1 while the feed connection is authenticated and subscribed"
    );
    describe_gauge!(
        "bar_ingest_subscriptions",
        "Number of symbols in the subscription registry"
    );
    describe_counter!(
        "bar_ingest_feed_errors_total",
        "Feed connection errors by type"
    );
    describe_counter!(
        "bar_ingest_reconnects_total",
        "Feed reconnection attempts"
    );

    describe_counter!(
        "bar_ingest_retention_deleted_total",
        "Bars removed by the retention job"
    );
}

// =============================================================================
// Metric Labels
// =============================================================================

/// Kind of decoded feed event.
#[derive(Debug, Clone, Copy)]
pub enum FrameKind {
    /// Aggregate bar.
    Aggregate,
    /// Status / ack.
    Status,
    /// Unrecognized event type.
    Unknown,
    /// Recognized event type with a bad payload.
    Malformed,
}

impl FrameKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Aggregate => "aggregate",
            Self::Status => "status",
            Self::Unknown => "unknown",
            Self::Malformed => "malformed",
        }
    }
}

/// Outcome of a bar write attempt.
#[derive(Debug, Clone, Copy)]
pub enum PersistOutcome {
    /// New row written.
    Inserted,
    /// Row already existed.
    Duplicate,
    /// Write failed.
    Failed,
}

impl PersistOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Duplicate => "duplicate",
            Self::Failed => "failed",
        }
    }
}

/// Reason a bar or task was dropped at enqueue.
#[derive(Debug, Clone, Copy)]
pub enum DropReason {
    /// Queue at capacity.
    Full,
    /// Bounded wait elapsed.
    Timeout,
    /// Queue closed for shutdown.
    Closed,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Timeout => "timeout",
            Self::Closed => "closed",
        }
    }
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a decoded feed event.
pub fn record_frame(kind: FrameKind) {
    counter!(
        "bar_ingest_frames_received_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record the outcome of a bar write.
pub fn record_persist(outcome: PersistOutcome, duration: Duration) {
    counter!(
        "bar_ingest_bars_persisted_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!("bar_ingest_persist_duration_seconds").record(duration.as_secs_f64());
}

/// Record a bar dropped before reaching the store.
pub fn record_bar_dropped(reason: DropReason) {
    counter!(
        "bar_ingest_bars_dropped_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record an enrichment task admitted to the queue.
pub fn record_enrichment_enqueued() {
    counter!("bar_ingest_enrichment_enqueued_total").increment(1);
}

/// Record an enrichment task rejected at enqueue.
pub fn record_enrichment_dropped(reason: DropReason) {
    counter!(
        "bar_ingest_enrichment_dropped_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a finished enrichment lookup. `outcome` is `ok` or an error kind.
pub fn record_enrichment_completed(outcome: &'static str) {
    counter!(
        "bar_ingest_enrichment_completed_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Update the feed liveness gauge.
pub fn set_feed_live(live: bool) {
    gauge!("bar_ingest_feed_live").set(if live { 1.0 } else { 0.0 });
}

/// Update the subscription count.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(count: usize) {
    gauge!("bar_ingest_subscriptions").set(count as f64);
}

/// Record a feed connection error.
pub fn record_feed_error(error_type: &'static str) {
    counter!(
        "bar_ingest_feed_errors_total",
        "error_type" => error_type
    )
    .increment(1);
}

/// Record a feed reconnection attempt.
pub fn record_reconnect() {
    counter!("bar_ingest_reconnects_total").increment(1);
}

/// Record bars removed by retention.
pub fn record_retention_deleted(count: u64) {
    counter!("bar_ingest_retention_deleted_total").increment(count);
}

// =============================================================================
// Tests
// =============================================================================
