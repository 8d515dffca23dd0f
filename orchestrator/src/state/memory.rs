//! In-process backend implementing the same compare-and-set contract as the
//! durable backends. Used by tests and single-process deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::store::{KvBackend, StoreError, StoreResult, Versioned};

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, Versioned>,
    /// Last version handed out per key; survives deletes so versions never repeat.
    versions: HashMap<String, u64>,
}

impl Inner {
    fn next_version(&mut self, key: &str) -> u64 {
        let v = self.versions.entry(key.to_string()).or_insert(0);
        *v += 1;
        *v
    }

    fn write(&mut self, key: &str, bytes: Vec<u8>) -> u64 {
        let version = self.next_version(key);
        self.entries
            .insert(key.to_string(), Versioned { version, bytes });
        version
    }
}

/// Mutex-guarded ordered map
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> StoreResult<Option<Versioned>> {
        Ok(self.lock()?.entries.get(key).cloned())
    }

    fn put(&self, key: &str, bytes: Vec<u8>) -> StoreResult<u64> {
        Ok(self.lock()?.write(key, bytes))
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        bytes: Vec<u8>,
    ) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        let current = inner.entries.get(key).map(|v| v.version);
        if current != expected {
            return Ok(false);
        }
        inner.write(key, bytes);
        Ok(true)
    }

    fn compare_and_delete(&self, key: &str, expected: u64) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        match inner.entries.get(key) {
            Some(v) if v.version == expected => {
                inner.entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.lock()?.entries.remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Versioned)>> {
        let inner = self.lock()?;
        Ok(inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
