//! Bounded-concurrency batch processing

use futures::stream::{self, StreamExt};
use orchestrator::{Orchestrator, ProcessOutcome};
use serde::Serialize;
use tracing::warn;

use crate::intake::{parse_line, Intake};

/// Result for one input line
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum LineOutcome {
    Processed(Box<ProcessOutcome>),
    Rejected { line: usize, error: String },
}

/// Run JSON lines through the pipeline with at most `concurrency` tickets
/// in flight. Blank lines are skipped; results arrive in completion order.
pub async fn process_lines(
    orchestrator: &Orchestrator,
    intake: &Intake,
    lines: Vec<String>,
    concurrency: usize,
) -> Vec<LineOutcome> {
    stream::iter(
        lines
            .into_iter()
            .enumerate()
            .filter(|(_, raw)| !raw.trim().is_empty()),
    )
    .map(|(idx, raw)| async move {
        let line = idx + 1;
        let incoming = match parse_line(line, &raw) {
            Ok(t) => t,
            Err(e) => {
                warn!(line, error = %e, "Skipping malformed ticket");
                return LineOutcome::Rejected {
                    line,
                    error: e.to_string(),
                };
            }
        };
        let ticket_id = incoming.ticket_id.clone();
        match orchestrator.process(intake.prepare(incoming)).await {
            Ok(outcome) => LineOutcome::Processed(Box::new(outcome)),
            Err(e) => {
                warn!(line, ticket_id = %ticket_id, error = %e, "Ticket processing failed");
                LineOutcome::Rejected {
                    line,
                    error: e.to_string(),
                }
            }
        }
    })
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator::assignment::default_roster;
    use orchestrator::{DedupDecision, KeywordUrgencyScorer, StateStore};
    use std::sync::Arc;

    fn orchestrator() -> Orchestrator {
        let orch = Orchestrator::builder(
            StateStore::in_memory().shared(),
            Arc::new(KeywordUrgencyScorer::new()),
        )
        .build();
        orch.seed_agents(default_roster()).unwrap();
        orch
    }

    fn processed(outcomes: &[LineOutcome]) -> Vec<&ProcessOutcome> {
        outcomes
            .iter()
            .filter_map(|o| match o {
                LineOutcome::Processed(p) => Some(p.as_ref()),
                LineOutcome::Rejected { .. } => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_mixed_batch() {
        let orch = orchestrator();
        let lines = vec![
            r#"{"ticket_id":"a","subject":"Refund","body":"double charge on my invoice"}"#.to_string(),
            String::new(),
            "garbage".to_string(),
            r#"{"ticket_id":"b","subject":"GDPR","body":"privacy request"}"#.to_string(),
        ];
        let outcomes = process_lines(&orch, &Intake::default(), lines, 4).await;
        assert_eq!(outcomes.len(), 3);

        let ok = processed(&outcomes);
        assert_eq!(ok.len(), 2);
        let billing = ok.iter().find(|o| o.ticket.ticket_id == "a").unwrap();
        assert_eq!(billing.assigned_agent.as_deref(), Some("billing-1"));
        let legal = ok.iter().find(|o| o.ticket.ticket_id == "b").unwrap();
        assert_eq!(legal.assigned_agent.as_deref(), Some("legal-1"));

        assert!(outcomes
            .iter()
            .any(|o| matches!(o, LineOutcome::Rejected { line: 3, .. })));
    }

    #[tokio::test]
    async fn test_flood_of_identical_tickets() {
        let orch = orchestrator();
        let lines: Vec<String> = (0..12)
            .map(|i| {
                format!(r#"{{"ticket_id":"login-{i}","subject":"Login broken","body":"cannot sign in"}}"#)
            })
            .collect();
        let outcomes = process_lines(&orch, &Intake::default(), lines, 1).await;
        let ok = processed(&outcomes);
        assert_eq!(ok.len(), 12);

        let created = ok
            .iter()
            .filter(|o| matches!(o.dedup.decision, DedupDecision::Created { .. }))
            .count();
        let linked = ok
            .iter()
            .filter(|o| matches!(o.dedup.decision, DedupDecision::Linked { .. }))
            .count();
        assert_eq!(created, 1);
        assert_eq!(linked, 1);
        assert_eq!(orch.list_incidents(None, 10).unwrap().len(), 1);
    }
}
