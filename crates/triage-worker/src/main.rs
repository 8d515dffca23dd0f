//! Triage worker CLI
//!
//! ```bash
//! # Score, deduplicate and assign a batch of tickets
//! URGENCY_MODEL_URL=http://10.0.0.40:8080/score triage-worker process --input tickets.jsonl
//!
//! # Inspect shared state (needs a durable store)
//! triage-worker --state-path ./.triage-state incidents --status open
//! triage-worker --state-path ./.triage-state resolve INC-000001
//! triage-worker --state-path ./.triage-state events --incident INC-000001
//! triage-worker --state-path ./.triage-state events --stats --since-minutes 60
//! ```

use std::io::{BufRead, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orchestrator::assignment::default_roster;
use orchestrator::{
    EventFilter, IncidentStatus, KeywordUrgencyScorer, Orchestrator, OrchestratorConfig, SharedStateStore,
    StateStore, UrgencyModel,
};
use serde::Serialize;
use tracing::{info, warn};
use triage_worker::{process_lines, HttpUrgencyModel, Intake, LineOutcome, WebhookAlertSink};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to RocksDB state directory shared between workers (requires the heavy-state feature)
    #[arg(long, global = true)]
    state_path: Option<PathBuf>,

    /// TOML config file; environment variables still override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process ticket JSON lines from a file or stdin ("-")
    Process {
        #[arg(long, default_value = "-")]
        input: String,

        /// Tickets in flight at once
        #[arg(long, default_value_t = 8)]
        concurrency: usize,
    },
    /// Pop the most urgent ticket and release its agent slot
    Dequeue,
    /// Circuit breaker status
    Status,
    /// List Master Incidents
    Incidents {
        #[arg(long)]
        status: Option<IncidentStatus>,

        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Resolve a Master Incident
    Resolve { incident_id: String },
    /// List agents
    Agents {
        #[arg(long, default_value_t = false)]
        online: bool,
    },
    /// List active assignments
    Assignments {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Recent orchestrator events
    Events {
        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Only events about this ticket
        #[arg(long)]
        ticket: Option<String>,

        /// Only events about this incident
        #[arg(long)]
        incident: Option<String>,

        /// Only events about this agent
        #[arg(long)]
        agent: Option<String>,

        /// Print counts by type instead of the events
        #[arg(long, default_value_t = false)]
        stats: bool,

        /// Window for --stats
        #[arg(long, default_value_t = 60)]
        since_minutes: i64,

        /// Delete events older than the configured retention first
        #[arg(long, default_value_t = false)]
        prune: bool,
    },
}

fn open_store(state_path: Option<PathBuf>) -> Result<SharedStateStore> {
    match state_path {
        #[cfg(feature = "heavy-state")]
        Some(path) => {
            info!("State path: {}", path.display());
            Ok(StateStore::open(&path)
                .map_err(|e| anyhow::anyhow!("Failed to open state store: {}", e))?
                .shared())
        }
        #[cfg(not(feature = "heavy-state"))]
        Some(path) => anyhow::bail!(
            "--state-path {} needs a build with the heavy-state feature",
            path.display()
        ),
        None => {
            warn!("No --state-path given; using an in-memory store for this run only");
            Ok(StateStore::in_memory().shared())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<OrchestratorConfig> {
    match path {
        Some(path) => OrchestratorConfig::from_toml_file(&path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(OrchestratorConfig::from_env()),
    }
}

fn primary_model() -> Result<Arc<dyn UrgencyModel>> {
    match HttpUrgencyModel::from_env()? {
        Some(model) => {
            info!(url = %model.url(), "Using HTTP urgency model");
            Ok(Arc::new(model))
        }
        None => {
            warn!("URGENCY_MODEL_URL not set; keyword scorer serves as primary model");
            Ok(Arc::new(KeywordUrgencyScorer::new()))
        }
    }
}

fn read_lines(input: &str) -> Result<Vec<String>> {
    if input == "-" {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        return Ok(raw.lines().map(str::to_string).collect());
    }
    let file = std::fs::File::open(input).with_context(|| format!("Failed to open {input}"))?;
    Ok(std::io::BufReader::new(file)
        .lines()
        .collect::<std::io::Result<Vec<_>>>()?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(args.config)?;
    let store = open_store(args.state_path)?;
    let alerts = WebhookAlertSink::from_env()?;
    if !alerts.is_enabled() {
        info!("WEBHOOK_URL not set; alerts are logged only");
    }

    let orchestrator = Orchestrator::builder(store, primary_model()?)
        .config(config)
        .alerts(Arc::new(alerts))
        .build();
    let seeded = orchestrator.seed_agents(default_roster())?;
    if seeded > 0 {
        info!(seeded, "Seeded default agent roster");
    }

    match args.command {
        Command::Process { input, concurrency } => {
            let lines = read_lines(&input)?;
            info!(lines = lines.len(), concurrency, "Processing tickets");
            let outcomes = process_lines(&orchestrator, &Intake::default(), lines, concurrency).await;
            let rejected = outcomes
                .iter()
                .filter(|o| matches!(o, LineOutcome::Rejected { .. }))
                .count();
            for outcome in &outcomes {
                println!("{}", serde_json::to_string(outcome)?);
            }
            info!(
                processed = outcomes.len() - rejected,
                rejected, "Batch complete"
            );
            let pruned = orchestrator.prune_events()?;
            if pruned > 0 {
                info!(pruned, "Pruned events past retention");
            }
        }
        Command::Dequeue => match orchestrator.dequeue()? {
            Some(dequeued) => print_json(&dequeued)?,
            None => info!("Queue is empty"),
        },
        Command::Status => print_json(&orchestrator.breaker_status()?)?,
        Command::Incidents { status, limit } => {
            print_json(&orchestrator.list_incidents(status, limit)?)?
        }
        Command::Resolve { incident_id } => {
            if orchestrator.resolve_incident(&incident_id)? {
                info!(incident_id = %incident_id, "Incident resolved");
            } else {
                anyhow::bail!("Unknown incident {incident_id}");
            }
        }
        Command::Agents { online } => print_json(&orchestrator.list_agents(online)?)?,
        Command::Assignments { limit } => print_json(&orchestrator.list_assignments(limit)?)?,
        Command::Events {
            limit,
            ticket,
            incident,
            agent,
            stats,
            since_minutes,
            prune,
        } => {
            if prune {
                let pruned = orchestrator.prune_events()?;
                info!(pruned, "Pruned events past retention");
            }
            if stats {
                let since = chrono::Duration::minutes(since_minutes.max(0));
                print_json(&orchestrator.event_stats(since)?)?;
            } else {
                let mut filter = EventFilter::new();
                if let Some(ticket) = &ticket {
                    filter = filter.ticket(ticket);
                }
                if let Some(incident) = &incident {
                    filter = filter.incident(incident);
                }
                if let Some(agent) = &agent {
                    filter = filter.agent(agent);
                }
                print_json(&orchestrator.query_events(&filter, limit)?)?;
            }
        }
    }

    Ok(())
}
