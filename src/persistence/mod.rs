//! Ledger storage capability and the in-process implementation.
//!
//! The Postgres implementation lives in `adapters::postgres`.

pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::{validate_fill, LedgerStore};
