//! Durable store interface.
//!
//! The concrete store belongs to the embedder. Every method is a single
//! atomic operation; engines never read-modify-write a whole record they do
//! not own.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::models::{AgentHealth, AgentIdentity, BufferedDocument, Policy, Statistics};
use crate::collector::CollectorKind;
use crate::error::StoreError;
use crate::schedule::TaskKind;

/// Identity, policy, statistics and ack token records.
pub trait StateStore: Send + Sync {
    fn load_identity(&self) -> Result<Option<AgentIdentity>, StoreError>;
    fn save_identity(&self, identity: &AgentIdentity) -> Result<(), StoreError>;

    fn load_policy(&self) -> Result<Option<Policy>, StoreError>;
    /// Replace the whole policy record.
    fn save_policy(&self, policy: &Policy) -> Result<(), StoreError>;
    /// Touch `last_updated`, and `action_id` when one is given. No-op without
    /// a stored policy.
    fn refresh_policy(
        &self,
        last_updated: DateTime<Utc>,
        action_id: Option<&str>,
    ) -> Result<(), StoreError>;
    fn set_backoff_interval(&self, task: TaskKind, secs: u64) -> Result<(), StoreError>;

    /// Create zeroed statistics unless a row already exists.
    fn init_statistics(&self) -> Result<(), StoreError>;
    fn load_statistics(&self) -> Result<Option<Statistics>, StoreError>;
    fn increment_checkins(&self) -> Result<(), StoreError>;
    fn increment_failures(&self) -> Result<(), StoreError>;
    /// Saturates at zero.
    fn adjust_buffer_size(&self, delta: i64) -> Result<(), StoreError>;
    fn record_shipment(&self, at: DateTime<Utc>, count: usize) -> Result<(), StoreError>;
    fn set_health(&self, health: AgentHealth) -> Result<(), StoreError>;

    fn load_ack_token(&self) -> Result<Option<String>, StoreError>;
    fn save_ack_token(&self, token: Option<&str>) -> Result<(), StoreError>;
}

/// Per-collector FIFO queues of pending documents.
pub trait DocumentQueue: Send + Sync {
    /// Append and return the assigned sequence number.
    fn append(&self, collector: CollectorKind, body: Value) -> Result<u64, StoreError>;
    fn peek_oldest(
        &self,
        collector: CollectorKind,
        limit: usize,
    ) -> Result<Vec<BufferedDocument>, StoreError>;
    /// Delete up to `limit` of the oldest documents; returns how many went.
    fn delete_oldest(&self, collector: CollectorKind, limit: usize) -> Result<usize, StoreError>;
    /// Remove and return up to `limit` of the oldest documents in one step.
    fn claim_oldest(
        &self,
        collector: CollectorKind,
        limit: usize,
    ) -> Result<Vec<BufferedDocument>, StoreError>;
    fn count(&self, collector: CollectorKind) -> Result<usize, StoreError>;
}

/// Everything an agent needs from its store.
pub trait AgentStore: StateStore + DocumentQueue {
    /// Delete identity, policy, statistics, ack token and every queue in one
    /// transaction.
    fn purge_all(&self) -> Result<(), StoreError>;
}
