//! Document envelope.
//!
//! Every buffered document carries the same flat, dotted ECS metadata in
//! front of its collector-specific fields.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use super::path::CollectorKind;
use crate::config::AgentConfig;
use crate::network::metadata::DeviceInfo;
use crate::storage::models::{AgentIdentity, Policy};

pub const ECS_VERSION: &str = "8.0.0";

/// Precomputed envelope fields for one collector under one policy.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEnvelope {
    kind: CollectorKind,
    base: Map<String, Value>,
}

impl DocumentEnvelope {
    pub fn new(
        kind: CollectorKind,
        identity: &AgentIdentity,
        policy: &Policy,
        device: &DeviceInfo,
        config: &AgentConfig,
    ) -> Self {
        let mut base = Map::new();
        let mut put = |key: &str, value: Value| {
            base.insert(key.to_string(), value);
        };

        put("agent.ephemeral_id", json!(identity.agent_id));
        put("agent.id", json!(identity.agent_id));
        put("agent.name", json!(identity.hostname));
        put("agent.type", json!(config.agent_type));
        put("agent.version", json!(config.agent_version));

        put("host.architecture", json!(device.architecture));
        put("host.hostname", json!(identity.hostname));
        put("host.name", json!(identity.hostname));
        put("host.id", json!(device.host_id));
        put("host.ip", json!(device.ips));
        put("host.mac", json!(device.macs));
        put("host.os.build", json!(device.os_build));
        put("host.os.family", json!(device.os_family));
        put("host.os.kernel", json!(device.os_kernel));
        put("host.os.name", json!(device.os_name));
        put("host.os.platform", json!(device.os_platform));
        put("host.os.version", json!(device.os_version));
        put("host.os.type", json!(device.os_platform));

        put("component.id", json!(kind.path_name()));
        put("component.state", json!("HEALTHY"));

        put("data_stream.dataset", json!(policy.data_stream.dataset));
        put("data_stream.namespace", json!(policy.data_stream.namespace));
        put("data_stream.type", json!("logs"));
        put("ecs.version", json!(ECS_VERSION));

        put("elastic_agent.id", json!(identity.agent_id));
        put("elastic_agent.snapshot", json!(config.snapshot));
        put("elastic_agent.version", json!(config.agent_version));
        put("elastic_agent.id_status", json!("verified"));
        put("event.dataset", json!(policy.data_stream.dataset));

        Self { kind, base }
    }

    pub fn kind(&self) -> CollectorKind {
        self.kind
    }

    /// Envelope followed by `fields`; collector fields win on key clashes.
    pub fn wrap(&self, fields: Map<String, Value>, timestamp: DateTime<Utc>) -> Value {
        let mut doc = Map::with_capacity(self.base.len() + fields.len() + 1);
        doc.insert(
            "@timestamp".to_string(),
            json!(timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        doc.extend(self.base.iter().map(|(k, v)| (k.clone(), v.clone())));
        doc.extend(fields);
        Value::Object(doc)
    }
}

/// Fields of a self-log document.
pub fn self_log_fields(level: log::Level, target: &str, message: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("event.action".to_string(), json!("syslog"));
    fields.insert("event.category".to_string(), json!("log"));
    fields.insert(
        "log.level".to_string(),
        json!(level.as_str().to_lowercase()),
    );
    fields.insert("tag".to_string(), json!(target));
    fields.insert("message".to_string(), json!(message));
    fields
}
