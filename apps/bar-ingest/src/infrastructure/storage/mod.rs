//! Bar Store Adapters
//!
//! - `PgBarStore`: Postgres via `SQLx`, the production store
//! - `InMemoryBarStore`: process-local store with the same uniqueness
//!   rules, used in tests and when no database is configured

mod in_memory;
mod postgres;

pub use in_memory::InMemoryBarStore;
pub use postgres::PgBarStore;
