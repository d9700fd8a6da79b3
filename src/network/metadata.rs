//! Host metadata reported to the fleet server.
//!
//! The embedder describes the device once through [`DeviceInfo`]; the same
//! data feeds enrollment, every check-in's `local_metadata` and the `host.*`
//! fields of each shipped document.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::AgentConfig;

/// Device description supplied by the embedder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub architecture: String,
    /// Stable hardware or installation id, reported as `host.id`.
    pub host_id: String,
    pub ips: Vec<String>,
    pub macs: Vec<String>,
    pub os_family: String,
    pub os_kernel: String,
    pub os_platform: String,
    pub os_version: String,
    pub os_name: String,
    pub os_full: String,
    pub os_build: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub version: String,
    pub snapshot: bool,
    #[serde(rename = "build.original")]
    pub build_original: String,
    pub upgradeable: bool,
    pub log_level: String,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticInfo {
    pub agent: AgentInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub architecture: String,
    pub hostname: String,
    pub name: String,
    pub id: String,
    pub ip: Vec<String>,
    pub mac: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub family: String,
    pub kernel: String,
    pub platform: String,
    pub version: String,
    pub name: String,
    pub full: String,
}

/// `local_metadata` block of enrollment and check-in requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalMetadata {
    pub elastic: ElasticInfo,
    pub host: HostInfo,
    pub system: SystemInfo,
}

impl LocalMetadata {
    /// `agent_id` is empty before enrollment completes.
    pub fn collect(
        agent_id: &str,
        hostname: &str,
        device: &DeviceInfo,
        config: &AgentConfig,
    ) -> Self {
        Self {
            elastic: ElasticInfo {
                agent: AgentInfo {
                    id: agent_id.to_string(),
                    version: config.agent_version.clone(),
                    snapshot: config.snapshot,
                    build_original: config.agent_version.clone(),
                    upgradeable: false,
                    log_level: config.self_log_level.clone(),
                    complete: false,
                },
            },
            host: HostInfo {
                architecture: device.architecture.clone(),
                hostname: hostname.to_string(),
                name: hostname.to_string(),
                id: device.host_id.clone(),
                ip: device.ips.clone(),
                mac: device.macs.clone(),
            },
            system: SystemInfo {
                family: device.os_family.clone(),
                kernel: device.os_kernel.clone(),
                platform: device.os_platform.clone(),
                version: device.os_version.clone(),
                name: device.os_name.clone(),
                full: device.os_full.clone(),
            },
        }
    }
}

/// `metadata` block of the enrollment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollMetadata {
    pub local: LocalMetadata,
    pub user_provided: Map<String, Value>,
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_local_metadata_shape() {
        let meta = LocalMetadata::collect(
            "agent-1",
            "pixel-7",
            &fixtures::device(),
            &AgentConfig::default(),
        );
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["elastic"]["agent"]["id"], "agent-1");
        assert!(value["elastic"]["agent"].get("build.original").is_some());
        assert_eq!(value["host"]["hostname"], "pixel-7");
        assert_eq!(value["host"]["ip"][0], "10.0.0.7");
        assert_eq!(value["system"]["platform"], "android");
    }
}
