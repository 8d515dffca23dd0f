//! Orchestrator configuration
//!
//! Defaults can be overridden by a TOML file and then by environment
//! variables. Invalid values are ignored with a warning and keep the
//! previous setting.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DEDUP_SIM_THRESHOLD` | 0.9 |
//! | `DEDUP_MIN_COUNT` | 10 |
//! | `DEDUP_WINDOW_SECONDS` | 300 |
//! | `TRANSFORMER_LATENCY_MS` | 500 |
//! | `CIRCUIT_COOLDOWN_SECONDS` | 60 |
//! | `CIRCUIT_HALF_OPEN_PROBES` | 3 |
//! | `ROUTING_LOAD_PENALTY_FACTOR` | 0.1 |
//! | `HIGH_URGENCY_THRESHOLD` | 0.8 |
//! | `EVENT_RETENTION_SECONDS` | 86400 |

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Circuit breaker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Logical model endpoint the breaker guards
    pub endpoint: String,
    /// Primary calls slower than this open the circuit
    pub latency_threshold_ms: u64,
    /// Time spent open before probing
    pub cooldown_secs: u64,
    /// Successful probes needed to close again
    pub half_open_probes: u32,
}

impl BreakerConfig {
    pub fn latency_threshold(&self) -> Duration {
        Duration::from_millis(self.latency_threshold_ms)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            endpoint: "urgency".to_string(),
            latency_threshold_ms: 500,
            cooldown_secs: 60,
            half_open_probes: 3,
        }
    }
}

/// Semantic deduplication settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Cosine similarity strictly above this counts as a near-duplicate
    pub sim_threshold: f32,
    /// A flood needs strictly more than this many similar tickets
    pub min_count: usize,
    /// Sliding window length
    pub window_seconds: u64,
}

impl DedupConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_seconds as i64)
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            sim_threshold: 0.9,
            min_count: 10,
            window_seconds: 300,
        }
    }
}

/// Assignment optimizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Weight of `current_load / max_concurrent_tickets` subtracted from skill match
    pub load_penalty_factor: f32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            load_penalty_factor: 0.1,
        }
    }
}

/// Individual alerting settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Tickets scoring strictly above this raise an individual alert
    pub high_urgency_threshold: f32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            high_urgency_threshold: 0.8,
        }
    }
}

/// Persisted event history settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Persisted events older than this are pruned
    pub retention_seconds: u64,
}

impl EventConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retention_seconds as i64)
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            retention_seconds: 86_400,
        }
    }
}

/// Full orchestrator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub breaker: BreakerConfig,
    pub dedup: DedupConfig,
    pub routing: RoutingConfig,
    pub alerts: AlertConfig,
    pub events: EventConfig,
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring unparsable config value");
            None
        }
    }
}

impl OrchestratorConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load a TOML file, then apply environment overrides on top
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env();
        Ok(config)
    }

    /// Parse TOML without consulting the environment
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = parse_var::<f32>(&lookup, "DEDUP_SIM_THRESHOLD") {
            if (-1.0..=1.0).contains(&v) {
                self.dedup.sim_threshold = v;
            } else {
                warn!(value = v, "DEDUP_SIM_THRESHOLD outside [-1, 1], ignoring");
            }
        }
        if let Some(v) = parse_var::<usize>(&lookup, "DEDUP_MIN_COUNT") {
            self.dedup.min_count = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "DEDUP_WINDOW_SECONDS").filter(|v| *v > 0) {
            self.dedup.window_seconds = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "TRANSFORMER_LATENCY_MS").filter(|v| *v > 0) {
            self.breaker.latency_threshold_ms = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "CIRCUIT_COOLDOWN_SECONDS") {
            self.breaker.cooldown_secs = v;
        }
        if let Some(v) = parse_var::<u32>(&lookup, "CIRCUIT_HALF_OPEN_PROBES").filter(|v| *v > 0) {
            self.breaker.half_open_probes = v;
        }
        if let Some(v) = parse_var::<f32>(&lookup, "ROUTING_LOAD_PENALTY_FACTOR")
            .filter(|v| v.is_finite() && *v >= 0.0)
        {
            self.routing.load_penalty_factor = v;
        }
        if let Some(v) = parse_var::<f32>(&lookup, "HIGH_URGENCY_THRESHOLD") {
            self.alerts.high_urgency_threshold = v.clamp(0.0, 1.0);
        }
        if let Some(v) = parse_var::<u64>(&lookup, "EVENT_RETENTION_SECONDS").filter(|v| *v > 0) {
            self.events.retention_seconds = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.dedup.sim_threshold, 0.9);
        assert_eq!(config.dedup.min_count, 10);
        assert_eq!(config.dedup.window_seconds, 300);
        assert_eq!(config.breaker.latency_threshold_ms, 500);
        assert_eq!(config.breaker.cooldown_secs, 60);
        assert_eq!(config.breaker.half_open_probes, 3);
        assert_eq!(config.routing.load_penalty_factor, 0.1);
        assert_eq!(config.alerts.high_urgency_threshold, 0.8);
        assert_eq!(config.events.retention_seconds, 86_400);
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = OrchestratorConfig::default();
        config.apply_overrides(lookup(&[
            ("DEDUP_MIN_COUNT", "4"),
            ("TRANSFORMER_LATENCY_MS", "250"),
            ("ROUTING_LOAD_PENALTY_FACTOR", "0.5"),
            ("EVENT_RETENTION_SECONDS", "3600"),
        ]));
        assert_eq!(config.dedup.min_count, 4);
        assert_eq!(config.events.retention(), chrono::Duration::hours(1));
        assert_eq!(config.breaker.latency_threshold_ms, 250);
        assert_eq!(config.routing.load_penalty_factor, 0.5);
    }

    #[test]
    fn test_invalid_overrides_keep_defaults() {
        let mut config = OrchestratorConfig::default();
        config.apply_overrides(lookup(&[
            ("DEDUP_SIM_THRESHOLD", "high"),
            ("CIRCUIT_HALF_OPEN_PROBES", "0"),
            ("DEDUP_WINDOW_SECONDS", "-5"),
            ("ROUTING_LOAD_PENALTY_FACTOR", "-1"),
            ("EVENT_RETENTION_SECONDS", "0"),
        ]));
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = OrchestratorConfig::from_toml_str(
            r#"
            [dedup]
            min_count = 3

            [breaker]
            cooldown_secs = 5

            [events]
            retention_seconds = 600
            "#,
        )
        .unwrap();
        assert_eq!(config.dedup.min_count, 3);
        assert_eq!(config.dedup.sim_threshold, 0.9);
        assert_eq!(config.breaker.cooldown_secs, 5);
        assert_eq!(config.breaker.half_open_probes, 3);
        assert_eq!(config.events.retention_seconds, 600);
    }
}
