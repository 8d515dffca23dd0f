//! RocksDB-backed durable backend
//!
//! Values are stored as a bincode envelope `{version, payload}`. Versions
//! come from a single persisted sequence so they never repeat for a key,
//! even across deletes and restarts. RocksDB admits one opening process,
//! so the writer mutex below is the serialization point for every
//! compare-and-set.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use rocksdb::{Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};

use super::store::{KvBackend, StoreError, StoreResult, Versioned};

/// Reserved key holding the last issued version.
const SEQ_KEY: &[u8] = b"\0meta:version_seq";

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u64,
    payload: Vec<u8>,
}

fn encode(env: &Envelope) -> StoreResult<Vec<u8>> {
    bincode::serde::encode_to_vec(env, bincode::config::standard())
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> StoreResult<Envelope> {
    bincode::serde::decode_from_slice::<Envelope, _>(bytes, bincode::config::standard())
        .map(|(env, _)| env)
        .map_err(|e| StoreError::Deserialization(e.to_string()))
}

pub struct RocksBackend {
    db: DB,
    /// Guards every write; holds the last issued version.
    writer: Mutex<u64>,
    path: PathBuf,
}

impl RocksBackend {
    /// Open or create a database at the given path
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, &path)?;

        let seq = match db.get(SEQ_KEY)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    StoreError::Deserialization("corrupt version sequence".to_string())
                })?;
                u64::from_be_bytes(arr)
            }
            None => 0,
        };

        Ok(Self {
            db,
            writer: Mutex::new(seq),
            path,
        })
    }

    /// Get the database path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn writer(&self) -> StoreResult<MutexGuard<'_, u64>> {
        self.writer.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn read(&self, key: &str) -> StoreResult<Option<Envelope>> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Write under an already-held writer lock.
    fn write_locked(&self, seq: &mut u64, key: &str, payload: Vec<u8>) -> StoreResult<u64> {
        let version = *seq + 1;
        let mut batch = WriteBatch::default();
        batch.put(key.as_bytes(), encode(&Envelope { version, payload })?);
        batch.put(SEQ_KEY, version.to_be_bytes());
        self.db.write(batch)?;
        *seq = version;
        Ok(version)
    }
}

impl KvBackend for RocksBackend {
    fn get(&self, key: &str) -> StoreResult<Option<Versioned>> {
        Ok(self.read(key)?.map(|env| Versioned {
            version: env.version,
            bytes: env.payload,
        }))
    }

    fn put(&self, key: &str, bytes: Vec<u8>) -> StoreResult<u64> {
        let mut seq = self.writer()?;
        self.write_locked(&mut seq, key, bytes)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        bytes: Vec<u8>,
    ) -> StoreResult<bool> {
        let mut seq = self.writer()?;
        let current = self.read(key)?.map(|env| env.version);
        if current != expected {
            return Ok(false);
        }
        self.write_locked(&mut seq, key, bytes)?;
        Ok(true)
    }

    fn compare_and_delete(&self, key: &str, expected: u64) -> StoreResult<bool> {
        let _seq = self.writer()?;
        match self.read(key)? {
            Some(env) if env.version == expected => {
                self.db.delete(key.as_bytes())?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let _seq = self.writer()?;
        self.db.delete(key.as_bytes())?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Versioned)>> {
        let mut out = Vec::new();
        for item in self.db.prefix_iterator(prefix.as_bytes()) {
            let (key, value) = item?;
            let Ok(key_str) = String::from_utf8(key.to_vec()) else {
                continue;
            };
            if !key_str.starts_with(prefix) {
                break; // Prefix no longer matches
            }
            let env = decode(&value)?;
            out.push((
                key_str,
                Versioned {
                    version: env.version,
                    bytes: env.payload,
                },
            ));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_backend() -> (RocksBackend, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let backend = RocksBackend::open(dir.path().join("state.db")).unwrap();
        (backend, dir)
    }

    #[test]
    fn test_cas_and_versions() {
        let (backend, _dir) = test_backend();
        assert!(backend.compare_and_swap("k", None, b"a".to_vec()).unwrap());
        let v = backend.get("k").unwrap().unwrap().version;
        assert!(!backend.compare_and_swap("k", None, b"b".to_vec()).unwrap());
        assert!(backend.compare_and_swap("k", Some(v), b"b".to_vec()).unwrap());
        assert!(backend.get("k").unwrap().unwrap().version > v);
    }

    #[test]
    fn test_version_sequence_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        let first = {
            let backend = RocksBackend::open(&path).unwrap();
            backend.put("k", b"a".to_vec()).unwrap()
        };
        let backend = RocksBackend::open(&path).unwrap();
        backend.delete("k").unwrap();
        let second = backend.put("k", b"b".to_vec()).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_scan_prefix() {
        let (backend, _dir) = test_backend();
        backend.put("incident:1", b"x".to_vec()).unwrap();
        backend.put("incident:2", b"y".to_vec()).unwrap();
        backend.put("incident_seq", b"z".to_vec()).unwrap();
        let keys: Vec<String> = backend
            .scan_prefix("incident:")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["incident:1", "incident:2"]);
    }
}
