//! Master Incident records and ticket membership
//!
//! Incidents live under `incident:{id}`; membership is tracked separately
//! under `ticket_incident:{ticket_id}` so "a ticket belongs to at most one
//! open incident" can be enforced with a single insert-if-absent.
//! Open incidents are also indexed under `open_incident:{id}` so matching
//! does not scan resolved history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::{schema, SharedStateStore, StoreError, StoreResult, MAX_CAS_RETRIES};
use crate::ticket::TicketId;

/// Lifecycle of a Master Incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Resolved,
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentStatus::Open => write!(f, "open"),
            IncidentStatus::Resolved => write!(f, "resolved"),
        }
    }
}

impl std::str::FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(IncidentStatus::Open),
            "resolved" => Ok(IncidentStatus::Resolved),
            other => Err(format!("unknown incident status: {other}")),
        }
    }
}

/// Aggregation record for a detected flash flood
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterIncident {
    pub incident_id: String,
    pub root_ticket_id: TicketId,
    /// Kept so new tickets can match after the root left the window
    pub root_embedding: Vec<f32>,
    /// Ordered, append-only, unique
    pub ticket_ids: Vec<TicketId>,
    pub summary: String,
    pub status: IncidentStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl MasterIncident {
    pub fn is_open(&self) -> bool {
        self.status == IncidentStatus::Open
    }

    pub fn contains(&self, ticket_id: &str) -> bool {
        self.ticket_ids.iter().any(|id| id == ticket_id)
    }
}

/// Summary line for a new incident
pub fn incident_summary(root_ticket_id: &str, subject: &str) -> String {
    let subject = subject.trim();
    if subject.is_empty() {
        format!("Incident (root: {root_ticket_id})")
    } else {
        subject.to_string()
    }
}

/// Incident persistence over the shared store
pub struct IncidentStore {
    store: SharedStateStore,
}

impl IncidentStore {
    pub fn new(store: SharedStateStore) -> Self {
        Self { store }
    }

    /// Allocate the next incident id (`INC-000001`, ...)
    pub fn next_id(&self) -> StoreResult<String> {
        let seq = self.store.increment(schema::INCIDENT_SEQ)?;
        Ok(format!("INC-{seq:06}"))
    }

    pub fn get(&self, incident_id: &str) -> StoreResult<Option<MasterIncident>> {
        self.store.get(&schema::keys::incident(incident_id))
    }

    /// Persist a new incident. Returns false if the id is already taken.
    pub fn insert(&self, incident: &MasterIncident) -> StoreResult<bool> {
        if !self
            .store
            .insert_if_absent(&schema::keys::incident(&incident.incident_id), incident)?
        {
            return Ok(false);
        }
        if incident.is_open() {
            self.store.put(
                &schema::keys::open_incident(&incident.incident_id),
                &incident.incident_id,
            )?;
        }
        Ok(true)
    }

    /// Delete an incident that never gained a member.
    ///
    /// Returns false (and leaves the record alone) once any ticket has been
    /// appended.
    pub fn discard_if_empty(&self, incident_id: &str) -> StoreResult<bool> {
        let key = schema::keys::incident(incident_id);
        let Some((version, incident)) = self.store.get_versioned::<MasterIncident>(&key)? else {
            return Ok(false);
        };
        if !incident.ticket_ids.is_empty() || !self.store.compare_and_delete(&key, version)? {
            return Ok(false);
        }
        self.store.delete(&schema::keys::open_incident(incident_id))?;
        Ok(true)
    }

    /// Open incidents, newest first, read through the open index
    pub fn list_open(&self) -> StoreResult<Vec<MasterIncident>> {
        let mut incidents = Vec::new();
        for (index_key, incident_id) in self.store.scan::<String>(schema::OPEN_INCIDENT_PREFIX)? {
            match self.get(&incident_id)? {
                Some(incident) if incident.is_open() => incidents.push(incident),
                // Left behind by an interrupted resolve or discard
                _ => self.store.delete(&index_key)?,
            }
        }
        incidents.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.incident_id.cmp(&a.incident_id))
        });
        Ok(incidents)
    }

    /// Incidents, newest first, optionally filtered by status
    pub fn list(
        &self,
        status: Option<IncidentStatus>,
        limit: usize,
    ) -> StoreResult<Vec<MasterIncident>> {
        let mut incidents: Vec<MasterIncident> = self
            .store
            .scan::<MasterIncident>(schema::INCIDENT_PREFIX)?
            .into_iter()
            .map(|(_, incident)| incident)
            .filter(|incident| status.map_or(true, |s| incident.status == s))
            .collect();
        incidents.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.incident_id.cmp(&a.incident_id))
        });
        incidents.truncate(limit);
        Ok(incidents)
    }

    /// Append a ticket to an open incident.
    ///
    /// Returns false if the incident is missing or resolved. Appending a
    /// ticket that is already a member is a no-op that returns true.
    pub fn append_ticket(&self, incident_id: &str, ticket_id: &str) -> StoreResult<bool> {
        let key = schema::keys::incident(incident_id);
        let mut accepted = false;
        self.store.update::<MasterIncident, _>(&key, |current| {
            accepted = false;
            let incident = current?;
            if !incident.is_open() {
                return None;
            }
            accepted = true;
            if incident.contains(ticket_id) {
                return None;
            }
            let mut next = incident.clone();
            next.ticket_ids.push(ticket_id.to_string());
            Some(next)
        })?;
        Ok(accepted)
    }

    /// Move an incident to `resolved`.
    ///
    /// Returns the stored incident and whether this call resolved it, or
    /// `None` if the id is unknown.
    pub fn resolve(
        &self,
        incident_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<(MasterIncident, bool)>> {
        let key = schema::keys::incident(incident_id);
        let written = self.store.update::<MasterIncident, _>(&key, |current| {
            let incident = current?;
            if !incident.is_open() {
                return None;
            }
            let mut next = incident.clone();
            next.status = IncidentStatus::Resolved;
            next.resolved_at = Some(at);
            Some(next)
        })?;
        let resolved = match written {
            Some(incident) => Some((incident, true)),
            None => self.get(incident_id)?.map(|incident| (incident, false)),
        };
        if resolved.is_some() {
            self.store.delete(&schema::keys::open_incident(incident_id))?;
        }
        Ok(resolved)
    }

    /// The incident a ticket is mapped to, if any
    pub fn incident_for_ticket(&self, ticket_id: &str) -> StoreResult<Option<MasterIncident>> {
        match self
            .store
            .get::<String>(&schema::keys::ticket_incident(ticket_id))?
        {
            Some(incident_id) => self.get(&incident_id),
            None => Ok(None),
        }
    }

    /// The open incident a ticket belongs to, if any
    pub fn open_incident_for_ticket(
        &self,
        ticket_id: &str,
    ) -> StoreResult<Option<MasterIncident>> {
        Ok(self
            .incident_for_ticket(ticket_id)?
            .filter(MasterIncident::is_open))
    }

    /// Map `ticket_id` to `incident_id`.
    ///
    /// Fails (returns false) if `incident_id` is not a stored open incident,
    /// or if the ticket already belongs to a different open incident. A
    /// mapping to a resolved or missing incident is stale and gets replaced.
    pub fn claim_ticket(&self, ticket_id: &str, incident_id: &str) -> StoreResult<bool> {
        if !self.get(incident_id)?.is_some_and(|i| i.is_open()) {
            debug!(ticket_id, incident_id, "Claim target is not an open incident");
            return Ok(false);
        }
        let key = schema::keys::ticket_incident(ticket_id);
        let claim = incident_id.to_string();

        for attempt in 0..MAX_CAS_RETRIES {
            if self.store.insert_if_absent(&key, &claim)? {
                return Ok(true);
            }
            let Some((version, current)) = self.store.get_versioned::<String>(&key)? else {
                continue;
            };
            if current == incident_id {
                return Ok(true);
            }
            if self.get(&current)?.is_some_and(|i| i.is_open()) {
                debug!(ticket_id, held_by = %current, "Ticket already in an open incident");
                return Ok(false);
            }
            if self.store.compare_and_swap(&key, Some(version), &claim)? {
                return Ok(true);
            }
            debug!(key = %key, attempt, "CAS conflict claiming ticket, retrying");
        }
        Err(StoreError::Contention {
            key,
            attempts: MAX_CAS_RETRIES,
        })
    }

    /// Drop a mapping if it still points at `incident_id`
    pub fn release_claim(&self, ticket_id: &str, incident_id: &str) -> StoreResult<()> {
        let key = schema::keys::ticket_incident(ticket_id);
        if let Some((version, current)) = self.store.get_versioned::<String>(&key)? {
            if current == incident_id {
                self.store.compare_and_delete(&key, version)?;
            }
        }
        Ok(())
    }
}
