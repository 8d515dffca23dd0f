//! Shared state store for orchestrator coordination
//!
//! Every piece of durable state (breaker, dedup window, incidents, agents,
//! assignments, queue) lives behind a [`KvBackend`]. The backend only knows
//! about versioned byte blobs; [`StateStore`] layers JSON encoding and an
//! optimistic read-modify-write loop on top so callers never do a blind
//! read-then-write.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

/// Attempts before an optimistic update gives up with [`StoreError::Contention`].
pub const MAX_CAS_RETRIES: usize = 64;

/// Error type for state store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Contention on key {key} after {attempts} attempts")]
    Contention { key: String, attempts: usize },
}

#[cfg(feature = "heavy-state")]
impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Result type for state store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A stored value together with its per-key version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub version: u64,
    pub bytes: Vec<u8>,
}

/// Raw key/value substrate with compare-and-set primitives.
///
/// Versions are per key and strictly increase on every successful write,
/// including writes that follow a delete.
pub trait KvBackend: Send + Sync {
    /// Read a key.
    fn get(&self, key: &str) -> StoreResult<Option<Versioned>>;

    /// Unconditionally write a key, returning the new version.
    fn put(&self, key: &str, bytes: Vec<u8>) -> StoreResult<u64>;

    /// Write only if the current version equals `expected`.
    ///
    /// `expected = None` means "only if the key is absent".
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        bytes: Vec<u8>,
    ) -> StoreResult<bool>;

    /// Delete only if the current version equals `expected`.
    fn compare_and_delete(&self, key: &str, expected: u64) -> StoreResult<bool>;

    /// Unconditionally delete a key.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// All entries whose key starts with `prefix`, ordered by key.
    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Versioned)>>;
}

/// Shared reference to StateStore
pub type SharedStateStore = Arc<StateStore>;

/// Typed, JSON-encoded view over a [`KvBackend`].
pub struct StateStore {
    backend: Arc<dyn KvBackend>,
}

impl StateStore {
    /// Wrap a backend
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// Store backed by process memory
    pub fn in_memory() -> Self {
        Self::new(Arc::new(super::memory::MemoryBackend::new()))
    }

    /// Open or create a RocksDB-backed store at the given path
    #[cfg(feature = "heavy-state")]
    pub fn open(path: impl Into<std::path::PathBuf>) -> StoreResult<Self> {
        Ok(Self::new(Arc::new(super::rocks::RocksBackend::open(path)?)))
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedStateStore {
        Arc::new(self)
    }

    /// The underlying raw backend
    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    // =========================================================================
    // Encoding helpers
    // =========================================================================

    fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Deserialization(e.to_string()))
    }

    // =========================================================================
    // Typed operations
    // =========================================================================

    /// Get a value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.backend.get(key)? {
            Some(v) => Ok(Some(Self::decode(&v.bytes)?)),
            None => Ok(None),
        }
    }

    /// Get a value with its version, for a later compare-and-set
    pub fn get_versioned<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<(u64, T)>> {
        match self.backend.get(key)? {
            Some(v) => Ok(Some((v.version, Self::decode(&v.bytes)?))),
            None => Ok(None),
        }
    }

    /// Store a value unconditionally
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        self.backend.put(key, Self::encode(value)?)?;
        Ok(())
    }

    /// Store a value only if the key does not exist yet
    pub fn insert_if_absent<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<bool> {
        self.backend.compare_and_swap(key, None, Self::encode(value)?)
    }

    /// Store a value only if the key is still at `version`
    pub fn compare_and_swap<T: Serialize>(
        &self,
        key: &str,
        version: Option<u64>,
        value: &T,
    ) -> StoreResult<bool> {
        self.backend.compare_and_swap(key, version, Self::encode(value)?)
    }

    /// Delete a key only if it is still at `version`
    pub fn compare_and_delete(&self, key: &str, version: u64) -> StoreResult<bool> {
        self.backend.compare_and_delete(key, version)
    }

    /// Delete a key
    pub fn delete(&self, key: &str) -> StoreResult<()> {
        self.backend.delete(key)
    }

    /// All values under a key prefix, ordered by key
    ///
    /// Entries that fail to decode are skipped with a warning so a single
    /// corrupt record cannot take down every listing query.
    pub fn scan<T: DeserializeOwned>(&self, prefix: &str) -> StoreResult<Vec<(String, T)>> {
        let mut out = Vec::new();
        for (key, v) in self.backend.scan_prefix(prefix)? {
            match Self::decode(&v.bytes) {
                Ok(value) => out.push((key, value)),
                Err(e) => warn!(key = %key, "Skipping undecodable record: {}", e),
            }
        }
        Ok(out)
    }

    /// Like [`scan`](Self::scan) but keeps versions.
    pub fn scan_versioned<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> StoreResult<Vec<(String, u64, T)>> {
        let mut out = Vec::new();
        for (key, v) in self.backend.scan_prefix(prefix)? {
            match Self::decode(&v.bytes) {
                Ok(value) => out.push((key, v.version, value)),
                Err(e) => warn!(key = %key, "Skipping undecodable record: {}", e),
            }
        }
        Ok(out)
    }

    /// Optimistic read-modify-write.
    ///
    /// `f` sees the current value (or `None`) and returns the value to write,
    /// or `None` to leave the key untouched. The closure may run several
    /// times; it must not have side effects. Returns the value written, or
    /// `None` if `f` declined.
    pub fn update<T, F>(&self, key: &str, mut f: F) -> StoreResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(Option<&T>) -> Option<T>,
    {
        for attempt in 0..MAX_CAS_RETRIES {
            let current = self.get_versioned::<T>(key)?;
            let (version, value) = match &current {
                Some((v, value)) => (Some(*v), Some(value)),
                None => (None, None),
            };
            let Some(next) = f(value) else {
                return Ok(None);
            };
            if self.compare_and_swap(key, version, &next)? {
                return Ok(Some(next));
            }
            debug!(key, attempt, "CAS conflict, retrying");
        }
        Err(StoreError::Contention {
            key: key.to_string(),
            attempts: MAX_CAS_RETRIES,
        })
    }

    /// Atomically increment a counter, returning the new value
    pub fn increment(&self, key: &str) -> StoreResult<u64> {
        let next = self.update::<u64, _>(key, |current| Some(current.copied().unwrap_or(0) + 1))?;
        next.ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}
