//! Application Ports (Driven)
//!
//! Interfaces the pipeline uses to reach external systems. Infrastructure
//! adapters implement these.
//!
//! - `BarStore`: asset and bar persistence
//! - `SymbolDetailsLookup`: reference-data lookup for enrichment

mod bar_store_port;
mod symbol_lookup_port;

pub use bar_store_port::{BarStore, BarWrite, StoreError};
pub use symbol_lookup_port::{LookupError, SymbolDetailsLookup};
