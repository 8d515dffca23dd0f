//! Sliding window of recent ticket embeddings
//!
//! One record per ticket under `dedup:window:{ticket_id}`. Expiry is lazy:
//! [`SlidingWindow::snapshot`] filters by age at read time, and
//! [`SlidingWindow::evict_expired`] prunes in the background of each
//! dedup pass. Pruning is best-effort; correctness only relies on the
//! read-time filter.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::{schema, SharedStateStore, StoreResult};
use crate::ticket::{TicketCategory, TicketId};

/// A ticket's footprint in the dedup window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowEntry {
    pub ticket_id: TicketId,
    pub embedding: Vec<f32>,
    pub timestamp: DateTime<Utc>,
    pub category: TicketCategory,
    pub urgency_score: f32,
}

/// Store-backed sliding window
pub struct SlidingWindow {
    store: SharedStateStore,
    length: Duration,
}

impl SlidingWindow {
    pub fn new(store: SharedStateStore, length: Duration) -> Self {
        Self { store, length }
    }

    pub fn length(&self) -> Duration {
        self.length
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.length
    }

    /// Live entries at `now`, oldest first
    pub fn snapshot(&self, now: DateTime<Utc>) -> StoreResult<Vec<WindowEntry>> {
        let cutoff = self.cutoff(now);
        let mut entries: Vec<WindowEntry> = self
            .store
            .scan::<WindowEntry>(schema::WINDOW_PREFIX)?
            .into_iter()
            .map(|(_, entry)| entry)
            .filter(|entry| entry.timestamp >= cutoff)
            .collect();
        entries.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.ticket_id.cmp(&b.ticket_id))
        });
        Ok(entries)
    }

    /// Add or refresh a ticket's entry
    pub fn insert(&self, entry: &WindowEntry) -> StoreResult<()> {
        self.store
            .put(&schema::keys::window_entry(&entry.ticket_id), entry)
    }

    /// Delete entries older than the window. Returns how many were removed.
    ///
    /// Uses compare-and-delete so an entry refreshed concurrently survives.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let cutoff = self.cutoff(now);
        let mut evicted = 0;
        for (key, version, entry) in self
            .store
            .scan_versioned::<WindowEntry>(schema::WINDOW_PREFIX)?
        {
            if entry.timestamp < cutoff && self.store.compare_and_delete(&key, version)? {
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(evicted, cutoff = %cutoff, "Evicted expired window entries");
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateStore;

    fn entry(id: &str, at: DateTime<Utc>) -> WindowEntry {
        WindowEntry {
            ticket_id: id.to_string(),
            embedding: vec![1.0, 0.0],
            timestamp: at,
            category: TicketCategory::Technical,
            urgency_score: 0.5,
        }
    }

    #[test]
    fn test_snapshot_excludes_expired_without_eviction() {
        let window = SlidingWindow::new(StateStore::in_memory().shared(), Duration::seconds(300));
        let now = Utc::now();
        window.insert(&entry("old", now - Duration::seconds(301))).unwrap();
        window.insert(&entry("edge", now - Duration::seconds(300))).unwrap();
        window.insert(&entry("new", now)).unwrap();

        let ids: Vec<String> = window
            .snapshot(now)
            .unwrap()
            .into_iter()
            .map(|e| e.ticket_id)
            .collect();
        assert_eq!(ids, vec!["edge", "new"]);
    }

    #[test]
    fn test_snapshot_is_time_ordered() {
        let window = SlidingWindow::new(StateStore::in_memory().shared(), Duration::seconds(300));
        let now = Utc::now();
        window.insert(&entry("a", now)).unwrap();
        window.insert(&entry("b", now - Duration::seconds(10))).unwrap();
        let snap = window.snapshot(now).unwrap();
        assert_eq!(snap[0].ticket_id, "b");
        assert_eq!(snap[1].ticket_id, "a");
    }

    #[test]
    fn test_evict_expired() {
        let store = StateStore::in_memory().shared();
        let window = SlidingWindow::new(store.clone(), Duration::seconds(60));
        let now = Utc::now();
        window.insert(&entry("old", now - Duration::seconds(120))).unwrap();
        window.insert(&entry("new", now)).unwrap();

        assert_eq!(window.evict_expired(now).unwrap(), 1);
        let left: Vec<(String, WindowEntry)> = store.scan(schema::WINDOW_PREFIX).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].1.ticket_id, "new");
    }
}
