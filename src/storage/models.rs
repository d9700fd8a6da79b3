//! Persistent agent records.
//!
//! Identity, policy and statistics are single-row records; buffered documents
//! live in per-collector queues.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collector::CollectorKind;
use crate::schedule::TaskKind;

/// Device identity established by enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub access_api_key: String,
    pub access_api_key_id: Option<String>,
    pub fleet_url: String,
    pub hostname: String,
    pub verify_cert: bool,
    /// PEM certificate supplied at enrollment, trusted for the Fleet server.
    pub fleet_certificate: Option<String>,
    pub enrolled_at: Option<String>,
    pub policy_id: Option<String>,
    pub status: Option<String>,
    pub active: bool,
}

/// Destination for buffered documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub name: String,
    pub api_key: String,
    pub hosts: Vec<String>,
    /// Hex SHA-256 of the CA certificate the output must present.
    pub ca_trusted_fingerprint: String,
    pub ca_certificate: Option<String>,
    pub output_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStream {
    pub dataset: String,
    pub namespace: String,
}

/// The active policy.
///
/// `backoff_checkin_interval` and `backoff_put_interval` are the working
/// intervals; they never drop below their nominal counterparts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub policy_id: Option<String>,
    pub revision: u64,
    pub action_id: String,
    pub created_at: Option<String>,
    pub protection_enabled: bool,
    pub uninstall_token_hash: Option<String>,
    pub input_name: Option<String>,
    pub allow_user_unenroll: bool,
    pub collector_paths: Vec<String>,
    pub output: OutputConfig,
    pub data_stream: DataStream,
    pub ignore_older: Option<String>,
    pub checkin_interval: u64,
    pub put_interval: u64,
    pub backoff_checkin_interval: u64,
    pub backoff_put_interval: u64,
    /// Zero means unbounded.
    pub max_backoff_interval: u64,
    pub use_backoff: bool,
    pub backoff_on_empty_buffer: bool,
    pub disable_if_battery_low: bool,
    pub max_documents_per_request: usize,
    pub last_updated: DateTime<Utc>,
}

impl Policy {
    pub fn nominal_interval(&self, task: TaskKind) -> u64 {
        match task {
            TaskKind::Checkin => self.checkin_interval,
            TaskKind::Upload => self.put_interval,
        }
    }

    pub fn backoff_interval(&self, task: TaskKind) -> u64 {
        match task {
            TaskKind::Checkin => self.backoff_checkin_interval,
            TaskKind::Upload => self.backoff_put_interval,
        }
    }

    pub fn set_backoff_interval(&mut self, task: TaskKind, secs: u64) {
        match task {
            TaskKind::Checkin => self.backoff_checkin_interval = secs,
            TaskKind::Upload => self.backoff_put_interval = secs,
        }
    }

    pub fn is_nominal(&self, task: TaskKind) -> bool {
        self.backoff_interval(task) == self.nominal_interval(task)
    }

    /// Data stream index the bulk request targets.
    pub fn target_index(&self) -> String {
        if self.data_stream.dataset.starts_with("logs-") {
            self.data_stream.dataset.clone()
        } else {
            format!(
                "logs-{}-{}",
                self.data_stream.dataset, self.data_stream.namespace
            )
        }
    }

    pub fn enables_path(&self, path_name: &str) -> bool {
        self.collector_paths.iter().any(|p| {
            p.strip_prefix(path_name)
                .map(|rest| rest.is_empty() || rest.starts_with('.') || rest.starts_with('?'))
                .unwrap_or(false)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AgentHealth {
    #[default]
    Healthy,
    Unhealthy,
}

impl fmt::Display for AgentHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentHealth::Healthy => write!(f, "Healthy"),
            AgentHealth::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// Singleton counters. Writers go through the store's increment operations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub total_checkins: u64,
    pub total_failures: u64,
    pub last_shipped_at: Option<DateTime<Utc>>,
    pub last_shipped_count: usize,
    pub combined_buffer_size: u64,
    pub agent_health: AgentHealth,
}

/// A document waiting in a collector queue. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedDocument {
    /// Monotonic insertion sequence, shared across all queues.
    pub seq: u64,
    pub collector: CollectorKind,
    pub appended_at: DateTime<Utc>,
    pub body: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_target_index() {
        let mut policy = fixtures::policy(5);
        policy.data_stream = DataStream {
            dataset: "fleet_agent.location".to_string(),
            namespace: "prod".to_string(),
        };
        assert_eq!(policy.target_index(), "logs-fleet_agent.location-prod");

        policy.data_stream.dataset = "logs-custom-stream".to_string();
        assert_eq!(policy.target_index(), "logs-custom-stream");
    }

    #[test]
    fn test_enables_path_matches_parameterised_entries() {
        let mut policy = fixtures::policy(1);
        policy.collector_paths = vec![
            "android://location.fused?minTimeMs=1000".to_string(),
            "android://self-log".to_string(),
        ];
        assert!(policy.enables_path("android://location"));
        assert!(policy.enables_path("android://self-log"));
        assert!(!policy.enables_path("android://security-logs"));
        assert!(!policy.enables_path("android://self"));
    }

    #[test]
    fn test_backoff_accessors() {
        let mut policy = fixtures::policy(1);
        assert!(policy.is_nominal(TaskKind::Checkin));
        policy.set_backoff_interval(TaskKind::Checkin, policy.checkin_interval * 2);
        assert!(!policy.is_nominal(TaskKind::Checkin));
        assert!(policy.is_nominal(TaskKind::Upload));
    }

    #[test]
    fn test_health_display() {
        assert_eq!(AgentHealth::Healthy.to_string(), "Healthy");
        assert_eq!(AgentHealth::Unhealthy.to_string(), "Unhealthy");
    }
}
