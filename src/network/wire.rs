//! Fleet wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::metadata::{EnrollMetadata, LocalMetadata};

pub const HEALTHY_STATUS: &str = "HEALTHY";
pub const ENROLL_TYPE_PERMANENT: &str = "PERMANENT";

pub const ACTION_POLICY_CHANGE: &str = "POLICY_CHANGE";
pub const ACTION_UNENROLL: &str = "UNENROLL";
pub const ACTION_REQUEST_DIAGNOSTICS: &str = "REQUEST_DIAGNOSTICS";

pub const ACK_EVENT_TYPE: &str = "ACTION_RESULT";
pub const ACK_EVENT_SUBTYPE: &str = "ACKNOWLEDGED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub name: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollRequest {
    #[serde(rename = "type")]
    pub enroll_type: String,
    pub enrollment_id: String,
    pub shared_id: String,
    pub metadata: EnrollMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollResponse {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub item: Option<EnrollItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub access_api_key: Option<String>,
    #[serde(default)]
    pub access_api_key_id: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub enrolled_at: Option<String>,
    #[serde(default)]
    pub policy_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, rename = "type")]
    pub agent_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinRequest {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack_token: Option<String>,
    pub local_metadata: LocalMetadata,
    pub message: String,
}

/// Actions stay raw JSON; the policy parser validates them field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinResponse {
    #[serde(default)]
    pub ack_token: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub actions: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub subtype: String,
    pub agent_id: String,
    pub action_id: String,
    pub message: String,
}

impl AckEvent {
    pub fn acknowledged(agent_id: &str, action_id: &str, message: String) -> Self {
        Self {
            event_type: ACK_EVENT_TYPE.to_string(),
            subtype: ACK_EVENT_SUBTYPE.to_string(),
            agent_id: agent_id.to_string(),
            action_id: action_id.to_string(),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckRequest {
    pub events: Vec<AckEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub items: Vec<AckItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckItem {
    pub status: u16,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub took: Option<u64>,
    #[serde(default)]
    pub items: Vec<Value>,
}

impl BulkResponse {
    /// Items whose operation reported a status outside 2xx.
    pub fn failed_items(&self) -> usize {
        self.items
            .iter()
            .filter(|item| {
                item.as_object()
                    .and_then(|ops| ops.values().next())
                    .and_then(|op| op.get("status"))
                    .and_then(Value::as_u64)
                    .map(|status| !(200..300).contains(&status))
                    .unwrap_or(false)
            })
            .count()
    }
}
