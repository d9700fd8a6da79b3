//! Agent configuration.
//!
//! Everything here is local to the installation. Anything the fleet server
//! controls (intervals, outputs, collector paths) lives in the stored policy
//! instead.

use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Prefix for environment overrides read by [`AgentConfig::from_env`].
pub const ENV_PREFIX: &str = "FLEET_AGENT_";

/// Local agent configuration with per-field defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Version reported in enrollment metadata and documents.
    pub agent_version: String,
    /// Value of the `type` field in `agent.*` document metadata.
    pub agent_type: String,
    pub user_agent: String,
    pub status_timeout_secs: u64,
    pub enroll_timeout_secs: u64,
    /// The check-in endpoint long-polls; hitting this timeout is a normal
    /// "no new actions" outcome, not a failure.
    pub checkin_timeout_secs: u64,
    pub ack_timeout_secs: u64,
    pub upload_timeout_secs: u64,
    pub checkin_message: String,
    /// Namespace used when a policy stream names none.
    pub default_namespace: String,
    /// Minimum level mirrored into the self-log buffer.
    pub self_log_level: String,
    pub snapshot: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let version = env!("CARGO_PKG_VERSION").to_string();
        Self {
            user_agent: format!("fleet-agent-core/{}", version),
            agent_version: version,
            agent_type: "fleet-agent".to_string(),
            status_timeout_secs: 10,
            enroll_timeout_secs: 10,
            checkin_timeout_secs: 5,
            ack_timeout_secs: 10,
            upload_timeout_secs: 30,
            checkin_message: "Fleet agent checkin.".to_string(),
            default_namespace: "default".to_string(),
            self_log_level: "info".to_string(),
            snapshot: false,
        }
    }
}

impl AgentConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `FLEET_AGENT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AgentConfig::default();
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("AGENT_VERSION") {
            config.agent_version = v;
        }
        if let Some(v) = var("AGENT_TYPE") {
            config.agent_type = v;
        }
        if let Some(v) = var("USER_AGENT") {
            config.user_agent = v;
        }
        if let Some(v) = var("CHECKIN_MESSAGE") {
            config.checkin_message = v;
        }
        if let Some(v) = var("DEFAULT_NAMESPACE") {
            config.default_namespace = v;
        }
        if let Some(v) = var("SELF_LOG_LEVEL") {
            config.self_log_level = v;
        }
        if let Some(v) = var("SNAPSHOT") {
            config.snapshot = parse_flag("snapshot", &v)?;
        }

        let timeouts: [(&'static str, &str, &mut u64); 5] = [
            ("status_timeout_secs", "STATUS_TIMEOUT_SECS", &mut config.status_timeout_secs),
            ("enroll_timeout_secs", "ENROLL_TIMEOUT_SECS", &mut config.enroll_timeout_secs),
            ("checkin_timeout_secs", "CHECKIN_TIMEOUT_SECS", &mut config.checkin_timeout_secs),
            ("ack_timeout_secs", "ACK_TIMEOUT_SECS", &mut config.ack_timeout_secs),
            ("upload_timeout_secs", "UPLOAD_TIMEOUT_SECS", &mut config.upload_timeout_secs),
        ];
        for (field, name, slot) in timeouts {
            if let Some(v) = var(name) {
                *slot = v.trim().parse().map_err(|_| ConfigError::Invalid {
                    field,
                    reason: format!("`{}` is not a whole number of seconds", v),
                })?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("status_timeout_secs", self.status_timeout_secs),
            ("enroll_timeout_secs", self.enroll_timeout_secs),
            ("checkin_timeout_secs", self.checkin_timeout_secs),
            ("ack_timeout_secs", self.ack_timeout_secs),
            ("upload_timeout_secs", self.upload_timeout_secs),
        ];
        for (field, secs) in timeouts {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "timeout must be at least one second".to_string(),
                });
            }
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "user_agent",
                reason: "must not be empty".to_string(),
            });
        }
        if self.default_namespace.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "default_namespace",
                reason: "must not be empty".to_string(),
            });
        }
        self.self_log_filter()?;
        Ok(())
    }

    pub fn self_log_filter(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.self_log_level).map_err(|_| ConfigError::Invalid {
            field: "self_log_level",
            reason: format!("`{}` is not a log level", self.self_log_level),
        })
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    pub fn enroll_timeout(&self) -> Duration {
        Duration::from_secs(self.enroll_timeout_secs)
    }

    pub fn checkin_timeout(&self) -> Duration {
        Duration::from_secs(self.checkin_timeout_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

fn parse_flag(field: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            field,
            reason: format!("`{}` is not a boolean", raw),
        }),
    }
}
