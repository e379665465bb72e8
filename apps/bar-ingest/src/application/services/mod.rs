//! Application Services
//!
//! Services that sit between the feed and the ports.
//!
//! - `PersistenceSink` / `PersistenceLanes`: per-symbol ordered bar writes
//! - `EnrichmentQueue` / `EnrichmentWorkers`: bounded, non-blocking lookups

mod enrichment;
mod persistence;

pub use enrichment::{EnrichmentConfig, EnrichmentQueue, EnrichmentReceiver, EnrichmentWorkers};
pub use persistence::{LaneConfig, PersistError, PersistenceLanes, PersistenceSink};

/// Error handing work to a bounded queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    /// The queue is at capacity.
    #[error("queue is full")]
    Full,

    /// Capacity did not free up within the allowed wait.
    #[error("timed out waiting for queue capacity")]
    Timeout,

    /// The queue no longer accepts work.
    #[error("queue is closed")]
    Closed,
}
