//! Durable priority queue of scored tickets
//!
//! One record per waiting ticket under `queue:{ticket_id}`. Pops claim the
//! record with compare-and-delete, so two consumers never receive the same
//! ticket.

use std::cmp::Ordering;

use tracing::debug;

use crate::state::{schema, SharedStateStore, StoreError, StoreResult, MAX_CAS_RETRIES};
use crate::ticket::Ticket;

/// Queue order: highest urgency, then oldest, then smallest id
fn priority(a: &Ticket, b: &Ticket) -> Ordering {
    b.urgency_score
        .partial_cmp(&a.urgency_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.ticket_id.cmp(&b.ticket_id))
}

pub struct TicketQueue {
    store: SharedStateStore,
}

impl TicketQueue {
    pub fn new(store: SharedStateStore) -> Self {
        Self { store }
    }

    /// Enqueue a ticket. Returns false if it is already waiting.
    pub fn push(&self, ticket: &Ticket) -> StoreResult<bool> {
        let added = self
            .store
            .insert_if_absent(&schema::keys::queued(&ticket.ticket_id), ticket)?;
        debug!(ticket_id = %ticket.ticket_id, added, "Ticket enqueued");
        Ok(added)
    }

    /// Remove and return the highest-priority ticket
    pub fn pop_max(&self) -> StoreResult<Option<Ticket>> {
        for attempt in 0..MAX_CAS_RETRIES {
            let best = self
                .store
                .scan_versioned::<Ticket>(schema::QUEUE_PREFIX)?
                .into_iter()
                .min_by(|(_, _, a), (_, _, b)| priority(a, b));
            let Some((key, version, ticket)) = best else {
                return Ok(None);
            };
            if self.store.compare_and_delete(&key, version)? {
                return Ok(Some(ticket));
            }
            debug!(key = %key, attempt, "Queue head claimed by another consumer, retrying");
        }
        Err(StoreError::Contention {
            key: schema::QUEUE_PREFIX.to_string(),
            attempts: MAX_CAS_RETRIES,
        })
    }

    /// The ticket `pop_max` would return, left in place
    pub fn peek(&self) -> StoreResult<Option<Ticket>> {
        Ok(self.snapshot()?.into_iter().next())
    }

    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.store.backend().scan_prefix(schema::QUEUE_PREFIX)?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// All waiting tickets in pop order
    pub fn snapshot(&self) -> StoreResult<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = self
            .store
            .scan::<Ticket>(schema::QUEUE_PREFIX)?
            .into_iter()
            .map(|(_, t)| t)
            .collect();
        tickets.sort_by(priority);
        Ok(tickets)
    }

    /// Drop every waiting ticket. Returns how many were removed.
    pub fn clear(&self) -> StoreResult<usize> {
        let mut removed = 0;
        for (key, version) in self
            .store
            .backend()
            .scan_prefix(schema::QUEUE_PREFIX)?
            .into_iter()
            .map(|(key, v)| (key, v.version))
        {
            if self.store.compare_and_delete(&key, version)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
