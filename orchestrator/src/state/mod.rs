//! Shared state for the orchestrator
//!
//! All mutable coordination state (breaker, dedup window, incidents, agents,
//! assignments, queue, event history) is kept in one key/value substrate
//! visible to every worker. Nothing is held in process globals.
//!
//! # Architecture
//!
//! - [`KvBackend`]: versioned bytes with compare-and-swap / compare-and-delete
//! - [`MemoryBackend`]: in-process implementation of the same contract
//! - `RocksBackend` (feature `heavy-state`): durable RocksDB implementation
//! - [`StateStore`]: JSON-typed layer with the optimistic `update` loop
//!
//! # Usage
//!
//! ```ignore
//! use orchestrator::state::StateStore;
//!
//! let store = StateStore::in_memory().shared();
//! store.update::<u64, _>("counter", |n| Some(n.copied().unwrap_or(0) + 1))?;
//! ```

pub mod memory;
#[cfg(feature = "heavy-state")]
pub mod rocks;
pub mod schema;
pub mod store;

pub use memory::MemoryBackend;
#[cfg(feature = "heavy-state")]
pub use rocks::RocksBackend;
pub use store::{
    KvBackend, SharedStateStore, StateStore, StoreError, StoreResult, Versioned, MAX_CAS_RETRIES,
};
