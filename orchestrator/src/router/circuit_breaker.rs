//! Circuit breaker guarding the primary urgency model.
//!
//! The breaker state lives in the shared state store so every worker sees
//! the same circuit. All transitions are compare-and-swap updates against
//! that record:
//!
//! ```text
//!   closed ──(slow / error)──▶ open ──(cooldown)──▶ half_open
//!     ▲                          ▲                      │
//!     │                          └──(any probe fails)───┤
//!     └─────────────(all probes succeed)────────────────┘
//! ```
//!
//! Each entry into `open` bumps a generation counter. A probe slot is
//! tagged with the generation it was taken in, and its verdict is dropped
//! if the circuit has since moved on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::BreakerConfig;
use crate::state::{schema, SharedStateStore, StoreError, StoreResult, MAX_CAS_RETRIES};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Healthy: primary model serves every call.
    Closed,
    /// Tripped: fallback serves every call until cooldown expires.
    Open,
    /// Cooldown expired: a limited number of probes reach the primary.
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Persisted breaker record, one per model endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub state: BreakerState,
    pub opened_at: Option<DateTime<Utc>>,
    /// When the current half-open epoch started
    pub half_open_at: Option<DateTime<Utc>>,
    pub half_open_probes_remaining: u32,
    pub consecutive_probe_successes: u32,
    /// Incremented on every transition into `open`
    pub generation: u64,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            opened_at: None,
            half_open_at: None,
            half_open_probes_remaining: 0,
            consecutive_probe_successes: 0,
            generation: 0,
        }
    }
}

impl CircuitBreakerState {
    fn opened(&self, now: DateTime<Utc>) -> Self {
        Self {
            state: BreakerState::Open,
            opened_at: Some(now),
            half_open_at: None,
            half_open_probes_remaining: 0,
            consecutive_probe_successes: 0,
            generation: self.generation + 1,
        }
    }

    fn half_opened(&self, now: DateTime<Utc>, probes: u32) -> Self {
        Self {
            state: BreakerState::HalfOpen,
            opened_at: self.opened_at,
            half_open_at: Some(now),
            half_open_probes_remaining: probes,
            consecutive_probe_successes: 0,
            generation: self.generation,
        }
    }

    fn closed(&self) -> Self {
        Self {
            generation: self.generation,
            ..Self::default()
        }
    }
}

/// Breaker status exposed to the API layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub state: BreakerState,
    pub opened_at: Option<DateTime<Utc>>,
    /// Probe slots still available in the current half-open epoch
    pub half_open_probes: u32,
}

/// What a caller is allowed to do for one scoring call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed: call the primary model.
    Primary,
    /// Holds one half-open probe slot of the given generation.
    Probe { generation: u64 },
    /// Use the fallback scorer.
    Fallback,
}

/// A state change caused by a breaker operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: BreakerState,
    pub to: BreakerState,
}

/// Shared-state circuit breaker for one model endpoint.
pub struct CircuitBreaker {
    store: SharedStateStore,
    clock: SharedClock,
    config: BreakerConfig,
    key: String,
}

impl CircuitBreaker {
    pub fn new(store: SharedStateStore, clock: SharedClock, config: BreakerConfig) -> Self {
        let key = schema::keys::breaker(&config.endpoint);
        Self {
            store,
            clock,
            config,
            key,
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Current record; a missing record is a closed circuit.
    pub fn snapshot(&self) -> StoreResult<CircuitBreakerState> {
        Ok(self
            .store
            .get::<CircuitBreakerState>(&self.key)?
            .unwrap_or_default())
    }

    pub fn status(&self) -> StoreResult<BreakerStatus> {
        let snap = self.snapshot()?;
        Ok(BreakerStatus {
            state: snap.state,
            opened_at: snap.opened_at,
            half_open_probes: snap.half_open_probes_remaining,
        })
    }

    /// Decide how the next call is served, performing any due
    /// `open -> half_open` transition and taking a probe slot if one is free.
    pub fn admit(&self) -> StoreResult<(Admission, Option<Transition>)> {
        let mut transition = None;

        for attempt in 0..MAX_CAS_RETRIES {
            let now = self.clock.now();
            let (version, current) = match self.store.get_versioned::<CircuitBreakerState>(&self.key)? {
                Some((v, s)) => (Some(v), s),
                None => (None, CircuitBreakerState::default()),
            };

            match current.state {
                BreakerState::Closed => return Ok((Admission::Primary, transition)),

                BreakerState::Open => {
                    let opened_at = current.opened_at.unwrap_or(DateTime::<Utc>::MIN_UTC);
                    if now - opened_at < self.config.cooldown() {
                        return Ok((Admission::Fallback, transition));
                    }
                    let next = current.half_opened(now, self.config.half_open_probes);
                    if self.store.compare_and_swap(&self.key, version, &next)? {
                        info!(
                            endpoint = %self.config.endpoint,
                            probes = self.config.half_open_probes,
                            "Circuit half-open: cooldown elapsed, probing primary model"
                        );
                        transition = Some(Transition {
                            from: BreakerState::Open,
                            to: BreakerState::HalfOpen,
                        });
                    }
                }

                BreakerState::HalfOpen => {
                    if current.half_open_probes_remaining == 0 {
                        // Probes handed out but no verdict within a cooldown:
                        // their holders are gone, so re-arm a fresh epoch.
                        let stale = current
                            .half_open_at
                            .map(|at| now - at >= self.config.cooldown())
                            .unwrap_or(true);
                        if !stale {
                            return Ok((Admission::Fallback, transition));
                        }
                        let mut next = current.half_opened(now, self.config.half_open_probes);
                        next.generation += 1;
                        if self.store.compare_and_swap(&self.key, version, &next)? {
                            warn!(
                                endpoint = %self.config.endpoint,
                                "Half-open probes stalled, re-arming probe budget"
                            );
                        }
                        continue;
                    }
                    let mut next = current.clone();
                    next.half_open_probes_remaining -= 1;
                    if self.store.compare_and_swap(&self.key, version, &next)? {
                        debug!(
                            endpoint = %self.config.endpoint,
                            remaining = next.half_open_probes_remaining,
                            "Probe slot taken"
                        );
                        return Ok((
                            Admission::Probe {
                                generation: current.generation,
                            },
                            transition,
                        ));
                    }
                }
            }
            debug!(key = %self.key, attempt, "Breaker CAS conflict, retrying");
        }

        Err(StoreError::Contention {
            key: self.key.clone(),
            attempts: MAX_CAS_RETRIES,
        })
    }

    /// Record a primary call that answered in time.
    pub fn record_success(&self, admission: Admission) -> StoreResult<Option<Transition>> {
        let Admission::Probe { generation } = admission else {
            return Ok(None);
        };
        let required = self.config.half_open_probes;

        let written = self.store.update::<CircuitBreakerState, _>(&self.key, |current| {
            let current = current?;
            if current.state != BreakerState::HalfOpen || current.generation != generation {
                return None;
            }
            let successes = current.consecutive_probe_successes + 1;
            if successes >= required {
                Some(current.closed())
            } else {
                let mut next = current.clone();
                next.consecutive_probe_successes = successes;
                Some(next)
            }
        })?;

        match written {
            Some(next) if next.state == BreakerState::Closed => {
                info!(endpoint = %self.config.endpoint, "Circuit closed: all probes succeeded");
                Ok(Some(Transition {
                    from: BreakerState::HalfOpen,
                    to: BreakerState::Closed,
                }))
            }
            _ => Ok(None),
        }
    }

    /// Record a primary call that failed or breached the latency bound.
    pub fn record_failure(&self, admission: Admission) -> StoreResult<Option<Transition>> {
        let now = self.clock.now();
        let from = match admission {
            Admission::Fallback => return Ok(None),
            Admission::Primary => BreakerState::Closed,
            Admission::Probe { .. } => BreakerState::HalfOpen,
        };

        let written = self.store.update::<CircuitBreakerState, _>(&self.key, |current| {
            let current = current.cloned().unwrap_or_default();
            match admission {
                // Someone else already opened it; keep their timestamp.
                Admission::Primary if current.state == BreakerState::Closed => {
                    Some(current.opened(now))
                }
                Admission::Probe { generation }
                    if current.state == BreakerState::HalfOpen
                        && current.generation == generation =>
                {
                    Some(current.opened(now))
                }
                _ => None,
            }
        })?;

        Ok(written.map(|_| {
            warn!(endpoint = %self.config.endpoint, from = %from, "Circuit opened");
            Transition {
                from,
                to: BreakerState::Open,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::state::StateStore;
    use chrono::Duration;
    use std::sync::Arc;

    fn breaker() -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cb = CircuitBreaker::new(
            StateStore::in_memory().shared(),
            clock.clone(),
            BreakerConfig::default(),
        );
        (cb, clock)
    }

    fn trip(cb: &CircuitBreaker) {
        let (admission, _) = cb.admit().unwrap();
        assert_eq!(admission, Admission::Primary);
        cb.record_failure(admission).unwrap();
    }

    #[test]
    fn test_circuit_starts_closed() {
        let (cb, _) = breaker();
        assert_eq!(cb.status().unwrap().state, BreakerState::Closed);
        assert_eq!(cb.admit().unwrap().0, Admission::Primary);
    }

    #[test]
    fn test_failure_in_closed_opens() {
        let (cb, clock) = breaker();
        trip(&cb);
        let status = cb.status().unwrap();
        assert_eq!(status.state, BreakerState::Open);
        assert_eq!(status.opened_at, Some(clock.now()));
        assert_eq!(cb.admit().unwrap().0, Admission::Fallback);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let (cb, clock) = breaker();
        trip(&cb);
        clock.advance(Duration::seconds(59));
        assert_eq!(cb.admit().unwrap().0, Admission::Fallback);

        clock.advance(Duration::seconds(1));
        let (admission, transition) = cb.admit().unwrap();
        assert!(matches!(admission, Admission::Probe { .. }));
        assert_eq!(
            transition,
            Some(Transition {
                from: BreakerState::Open,
                to: BreakerState::HalfOpen
            })
        );
        assert_eq!(cb.status().unwrap().half_open_probes, 2);
    }

    #[test]
    fn test_all_probes_succeed_closes() {
        let (cb, clock) = breaker();
        trip(&cb);
        clock.advance(Duration::seconds(60));

        let probes: Vec<Admission> = (0..3).map(|_| cb.admit().unwrap().0).collect();
        assert_eq!(cb.admit().unwrap().0, Admission::Fallback);

        assert_eq!(cb.record_success(probes[0]).unwrap(), None);
        assert_eq!(cb.record_success(probes[1]).unwrap(), None);
        let closed = cb.record_success(probes[2]).unwrap();
        assert_eq!(closed.map(|t| t.to), Some(BreakerState::Closed));
        assert_eq!(cb.snapshot().unwrap().consecutive_probe_successes, 0);
        assert_eq!(cb.admit().unwrap().0, Admission::Primary);
    }

    #[test]
    fn test_probe_failure_reopens_with_fresh_timestamp() {
        let (cb, clock) = breaker();
        trip(&cb);
        let first_open = cb.status().unwrap().opened_at;
        clock.advance(Duration::seconds(61));

        let probe = cb.admit().unwrap().0;
        cb.record_success(probe).unwrap();
        let probe = cb.admit().unwrap().0;
        let t = cb.record_failure(probe).unwrap();
        assert_eq!(t.map(|t| t.to), Some(BreakerState::Open));

        let status = cb.status().unwrap();
        assert_eq!(status.state, BreakerState::Open);
        assert_ne!(status.opened_at, first_open);
        assert_eq!(status.opened_at, Some(clock.now()));
    }

    #[test]
    fn test_stale_probe_verdict_is_ignored() {
        let (cb, clock) = breaker();
        trip(&cb);
        clock.advance(Duration::seconds(60));
        let old_probe = cb.admit().unwrap().0;
        let failing_probe = cb.admit().unwrap().0;
        cb.record_failure(failing_probe).unwrap();

        // A late success from the previous epoch must not count.
        clock.advance(Duration::seconds(60));
        let _ = cb.admit().unwrap();
        assert_eq!(cb.record_success(old_probe).unwrap(), None);
        assert_eq!(cb.snapshot().unwrap().consecutive_probe_successes, 0);
    }

    #[test]
    fn test_second_closed_failure_keeps_original_opened_at() {
        let (cb, clock) = breaker();
        let a = cb.admit().unwrap().0;
        let b = cb.admit().unwrap().0;
        cb.record_failure(a).unwrap();
        let opened_at = cb.status().unwrap().opened_at;

        clock.advance(Duration::seconds(5));
        assert_eq!(cb.record_failure(b).unwrap(), None);
        assert_eq!(cb.status().unwrap().opened_at, opened_at);
    }

    #[test]
    fn test_stalled_probes_are_rearmed() {
        let (cb, clock) = breaker();
        trip(&cb);
        clock.advance(Duration::seconds(60));
        for _ in 0..3 {
            cb.admit().unwrap();
        }
        assert_eq!(cb.admit().unwrap().0, Admission::Fallback);

        clock.advance(Duration::seconds(60));
        assert!(matches!(cb.admit().unwrap().0, Admission::Probe { .. }));
    }

    #[test]
    fn test_concurrent_callers_never_share_probe_slots() {
        let (cb, clock) = breaker();
        trip(&cb);
        clock.advance(Duration::seconds(60));

        let cb = Arc::new(cb);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cb = cb.clone();
                std::thread::spawn(move || cb.admit().unwrap().0)
            })
            .collect();
        let probes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|a| matches!(a, Admission::Probe { .. }))
            .count();
        assert_eq!(probes, 3);
    }
}
