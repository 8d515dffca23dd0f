//! Concurrent dedup workers sharing one state store
//!
//! Two engines stand in for two orchestrator processes. Threads feed them a
//! burst of near-identical tickets; afterwards no ticket may sit in more
//! than one open incident and every membership mapping must agree with the
//! incident that lists the ticket.

use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Utc;
use orchestrator::{
    DedupConfig, DedupEngine, EventBus, IncidentStatus, SharedStateStore, StateStore,
    SystemClock, Ticket, TicketCategory,
};

const WORKERS: usize = 8;
const TICKETS_PER_WORKER: usize = 12;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

fn engine(store: SharedStateStore) -> Arc<DedupEngine> {
    Arc::new(DedupEngine::new(
        store,
        EventBus::new().shared(),
        Arc::new(SystemClock),
        DedupConfig {
            min_count: 3,
            ..Default::default()
        },
    ))
}

fn outage_ticket(worker: usize, i: usize) -> Ticket {
    Ticket {
        ticket_id: format!("w{worker}-t{i:02}"),
        subject: "Checkout failing".to_string(),
        body: "payment page times out".to_string(),
        category: TicketCategory::Technical,
        urgency_score: 0.9,
        embedding: vec![1.0, 0.001 * (worker * TICKETS_PER_WORKER + i) as f32, 0.0],
        created_at: Utc::now(),
    }
}

#[test]
fn test_parallel_engines_never_share_a_ticket_between_open_incidents() {
    init_tracing();
    let store = StateStore::in_memory().shared();
    let engines = [engine(store.clone()), engine(store)];
    let barrier = Arc::new(Barrier::new(WORKERS));

    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let engine = engines[worker % engines.len()].clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for i in 0..TICKETS_PER_WORKER {
                    engine.process(&outage_ticket(worker, i)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let open = engines[0]
        .list_incidents(Some(IncidentStatus::Open), usize::MAX)
        .unwrap();
    assert!(!open.is_empty(), "a burst this size must open an incident");

    let mut holders: HashMap<&str, Vec<&str>> = HashMap::new();
    for incident in &open {
        for ticket_id in &incident.ticket_ids {
            holders
                .entry(ticket_id.as_str())
                .or_default()
                .push(incident.incident_id.as_str());
        }
    }
    for (ticket_id, incidents) in &holders {
        assert_eq!(
            incidents.len(),
            1,
            "{ticket_id} is in several open incidents: {incidents:?}"
        );
        let mapped = engines[1].incident_for_ticket(ticket_id).unwrap().unwrap();
        assert_eq!(mapped.incident_id, incidents[0]);
    }

    // Member lists stay unique within each incident too
    for incident in &open {
        let mut ids = incident.ticket_ids.clone();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), incident.ticket_ids.len());
    }
}

#[test]
fn test_reprocessing_the_same_ticket_on_both_engines_links_once() {
    init_tracing();
    let store = StateStore::in_memory().shared();
    let engines = [engine(store.clone()), engine(store)];

    for i in 0..4 {
        engines[i % 2].process(&outage_ticket(0, i)).unwrap();
    }
    let first = engines[0].process(&outage_ticket(0, 3)).unwrap();
    let second = engines[1].process(&outage_ticket(0, 3)).unwrap();
    assert_eq!(first, second);

    let open = engines[1]
        .list_incidents(Some(IncidentStatus::Open), usize::MAX)
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(
        open[0].ticket_ids.iter().filter(|id| *id == "w0-t03").count(),
        1
    );
}
