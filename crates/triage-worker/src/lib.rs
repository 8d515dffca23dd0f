//! Triage worker
//!
//! The process that feeds the orchestrator: reads raw tickets, assigns a
//! category with keyword patterns, embeds the text, and runs each ticket
//! through `Orchestrator::process`. Also provides the HTTP urgency model
//! client and the chat webhook alert sink used in production.

pub mod classifier;
pub mod embedder;
pub mod http_model;
pub mod intake;
pub mod runner;
pub mod webhook;

pub use classifier::CategoryClassifier;
pub use embedder::{HashingEmbedder, EMBEDDING_DIM};
pub use http_model::HttpUrgencyModel;
pub use intake::{parse_line, IncomingTicket, Intake, IntakeError};
pub use runner::{process_lines, LineOutcome};
pub use webhook::WebhookAlertSink;
