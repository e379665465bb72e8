//! Frame Dispatcher
//!
//! Routes decoded feed events once the connection is live. Aggregates go to
//! the persistence lanes; the first aggregate for each symbol also queues an
//! enrichment lookup. Status events are logged. Unknown and malformed
//! events are counted and skipped, never fatal to the connection.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use super::codec::FeedEvent;
use super::messages::StatusKind;
use crate::application::services::{EnqueueError, EnrichmentQueue, PersistenceLanes};
use crate::domain::subscription::Symbol;
use crate::infrastructure::metrics::{self, FrameKind};

/// What happened to a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Bar handed to a persistence lane.
    Queued {
        /// First bar for this symbol since start.
        new_symbol: bool,
    },
    /// Bar dropped because its lane stayed full or closed.
    Dropped,
    /// Status event logged.
    Status,
    /// Unknown or malformed event skipped.
    Skipped,
}

/// Per-frame tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Bars queued for persistence.
    pub queued: usize,
    /// Bars dropped.
    pub dropped: usize,
    /// Status events.
    pub statuses: usize,
    /// Unknown or malformed events.
    pub skipped: usize,
}

/// Classifies decoded events and hands them to the pipeline stages.
#[derive(Debug)]
pub struct FrameDispatcher {
    lanes: PersistenceLanes,
    enrichment: Arc<EnrichmentQueue>,
    seen: Mutex<HashSet<Symbol>>,
}

impl FrameDispatcher {
    /// Create a dispatcher over the given lanes and enrichment queue.
    #[must_use]
    pub fn new(lanes: PersistenceLanes, enrichment: Arc<EnrichmentQueue>) -> Self {
        Self {
            lanes,
            enrichment,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Dispatch every event of one frame, in order.
    pub async fn dispatch(&self, events: Vec<FeedEvent>) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for event in events {
            match self.dispatch_event(event).await {
                Dispatch::Queued { .. } => summary.queued += 1,
                Dispatch::Dropped => summary.dropped += 1,
                Dispatch::Status => summary.statuses += 1,
                Dispatch::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    /// Dispatch a single event.
    pub async fn dispatch_event(&self, event: FeedEvent) -> Dispatch {
        match event {
            FeedEvent::Aggregate(msg) => {
                metrics::record_frame(FrameKind::Aggregate);
                let bar = msg.to_bar();
                let symbol = bar.symbol.clone();

                if self.lanes.submit(bar).await.is_err() {
                    return Dispatch::Dropped;
                }

                let new_symbol = self.mark_seen(&symbol);
                if new_symbol {
                    self.enqueue_enrichment(&symbol);
                }
                Dispatch::Queued { new_symbol }
            }
            FeedEvent::Status(status) => {
                metrics::record_frame(FrameKind::Status);
                match status.kind() {
                    StatusKind::Error | StatusKind::AuthFailed => tracing::warn!(
                        status = %status.status,
                        message = %status.message,
                        "Feed reported error status"
                    ),
                    _ => tracing::info!(
                        status = %status.status,
                        message = %status.message,
                        "Feed status"
                    ),
                }
                Dispatch::Status
            }
            FeedEvent::Unknown { event_type } => {
                metrics::record_frame(FrameKind::Unknown);
                tracing::debug!(event_type, "Ignoring unhandled event type");
                Dispatch::Skipped
            }
            FeedEvent::Malformed { event_type, reason } => {
                metrics::record_frame(FrameKind::Malformed);
                tracing::warn!(
                    event_type = event_type.as_deref().unwrap_or("<none>"),
                    reason,
                    "Skipping malformed event"
                );
                Dispatch::Skipped
            }
        }
    }

    /// Number of distinct symbols seen since start.
    #[must_use]
    pub fn seen_symbols(&self) -> usize {
        self.seen.lock().len()
    }

    fn mark_seen(&self, symbol: &str) -> bool {
        self.seen.lock().insert(symbol.to_string())
    }

    fn enqueue_enrichment(&self, symbol: &str) {
        match self.enrichment.try_enqueue(symbol) {
            Ok(()) | Err(EnqueueError::Closed | EnqueueError::Timeout) => {}
            Err(EnqueueError::Full) => {
                // Let a later bar for the symbol try again.
                self.seen.lock().remove(symbol);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
