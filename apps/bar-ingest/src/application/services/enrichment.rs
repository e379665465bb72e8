//! Enrichment Queue and Workers
//!
//! Newly seen symbols are looked up against the reference-data API off the
//! hot path. The queue is bounded and admission never blocks: when it is
//! full the task is dropped and logged. A fixed pool of workers drains the
//! queue, so at most `workers` lookups are in flight at once.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::EnqueueError;
use crate::application::ports::SymbolDetailsLookup;
use crate::domain::market_data::EnrichmentTask;
use crate::infrastructure::metrics::{self, DropReason};

// =============================================================================
// Configuration
// =============================================================================

/// Enrichment configuration.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Queue capacity.
    pub capacity: usize,
    /// Number of concurrent lookup workers.
    pub workers: usize,
    /// Upper bound on a single lookup.
    pub lookup_timeout: Duration,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            workers: 4,
            lookup_timeout: Duration::from_secs(10),
        }
    }
}

// =============================================================================
// Queue
// =============================================================================

/// Producer side of the enrichment queue.
#[derive(Debug)]
pub struct EnrichmentQueue {
    tx: RwLock<Option<mpsc::Sender<EnrichmentTask>>>,
    capacity: usize,
}

/// Consumer side of the enrichment queue, handed to the worker pool.
#[derive(Debug)]
pub struct EnrichmentReceiver {
    rx: mpsc::Receiver<EnrichmentTask>,
}

impl EnrichmentQueue {
    /// Create a bounded queue.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, EnrichmentReceiver) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx: RwLock::new(Some(tx)),
                capacity,
            },
            EnrichmentReceiver { rx },
        )
    }

    /// Enqueue a lookup for `symbol` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::Full`] at capacity, or
    /// [`EnqueueError::Closed`] after [`close`](Self::close).
    pub fn try_enqueue(&self, symbol: &str) -> Result<(), EnqueueError> {
        let guard = self.tx.read();
        let Some(tx) = guard.as_ref() else {
            metrics::record_enrichment_dropped(DropReason::Closed);
            return Err(EnqueueError::Closed);
        };

        match tx.try_send(EnrichmentTask::new(symbol)) {
            Ok(()) => {
                metrics::record_enrichment_enqueued();
                tracing::debug!(symbol, "Queued symbol for enrichment");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(task)) => {
                metrics::record_enrichment_dropped(DropReason::Full);
                tracing::warn!(
                    symbol = %task.symbol,
                    capacity = self.capacity,
                    "Enrichment queue full, dropping task"
                );
                Err(EnqueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                metrics::record_enrichment_dropped(DropReason::Closed);
                Err(EnqueueError::Closed)
            }
        }
    }

    /// Stop accepting new tasks. Already queued tasks are still drained.
    pub fn close(&self) {
        if self.tx.write().take().is_some() {
            tracing::debug!("Enrichment queue closed");
        }
    }

    /// Whether the queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.read().is_none()
    }

    /// Number of tasks currently waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tx
            .read()
            .as_ref()
            .map_or(0, |tx| self.capacity - tx.capacity())
    }

    /// Whether no tasks are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

// =============================================================================
// Worker Pool
// =============================================================================

/// Fixed pool of lookup workers sharing one queue.
#[derive(Debug)]
pub struct EnrichmentWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl EnrichmentWorkers {
    /// Spawn `config.workers` workers over the queue's receiver.
    ///
    /// Workers exit once the queue is closed and drained, or immediately
    /// when `cancel` fires (abandoning any in-flight lookup).
    #[must_use]
    pub fn spawn(
        receiver: EnrichmentReceiver,
        lookup: Arc<dyn SymbolDetailsLookup>,
        config: &EnrichmentConfig,
        cancel: &CancellationToken,
    ) -> Self {
        let rx = Arc::new(Mutex::new(receiver.rx));
        let handles = (0..config.workers.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&rx),
                    Arc::clone(&lookup),
                    config.lookup_timeout,
                    cancel.clone(),
                ))
            })
            .collect();

        Self { handles }
    }

    /// Number of workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the pool has no workers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Enrichment worker panicked");
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<EnrichmentTask>>>,
    lookup: Arc<dyn SymbolDetailsLookup>,
    lookup_timeout: Duration,
    cancel: CancellationToken,
) {
    tracing::debug!(worker, "Enrichment worker started");

    loop {
        let task = {
            let mut receiver = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                guard = rx.lock() => guard,
            };
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                task = receiver.recv() => task,
            }
        };
        let Some(task) = task else { break };

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(worker, symbol = %task.symbol, "Abandoning in-flight lookup");
                break;
            }
            result = tokio::time::timeout(
                lookup_timeout,
                lookup.fetch_symbol_details(&task.symbol),
            ) => result,
        };

        match result {
            Ok(Ok(details)) => {
                metrics::record_enrichment_completed("ok");
                tracing::info!(
                    symbol = %details.symbol,
                    name = details.name.as_deref().unwrap_or(""),
                    market = details.market.as_deref().unwrap_or(""),
                    active = ?details.active,
                    "Fetched symbol details"
                );
            }
            Ok(Err(e)) => {
                metrics::record_enrichment_completed(e.kind());
                tracing::warn!(worker, symbol = %task.symbol, error = %e, "Symbol lookup failed");
            }
            Err(_) => {
                metrics::record_enrichment_completed("timeout");
                tracing::warn!(
                    worker,
                    symbol = %task.symbol,
                    timeout_ms = lookup_timeout.as_millis(),
                    "Symbol lookup timed out"
                );
            }
        }
    }

    tracing::debug!(worker, "Enrichment worker stopped");
}

// =============================================================================
// Tests
// =============================================================================
