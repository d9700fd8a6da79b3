//! In-memory store.
//!
//! Every operation takes a single lock, which gives the same atomicity a
//! transactional store provides. Used by tests and by embedders that persist
//! elsewhere.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use super::models::{AgentHealth, AgentIdentity, BufferedDocument, Policy, Statistics};
use super::store::{AgentStore, DocumentQueue, StateStore};
use crate::collector::CollectorKind;
use crate::error::StoreError;
use crate::schedule::TaskKind;

#[derive(Debug, Default)]
struct MemoryState {
    identity: Option<AgentIdentity>,
    policy: Option<Policy>,
    statistics: Option<Statistics>,
    ack_token: Option<String>,
    queues: HashMap<CollectorKind, VecDeque<BufferedDocument>>,
    next_seq: u64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total documents across all queues.
    pub fn total_buffered(&self) -> usize {
        self.state.lock().queues.values().map(VecDeque::len).sum()
    }
}

impl StateStore for MemoryStore {
    fn load_identity(&self) -> Result<Option<AgentIdentity>, StoreError> {
        Ok(self.state.lock().identity.clone())
    }

    fn save_identity(&self, identity: &AgentIdentity) -> Result<(), StoreError> {
        self.state.lock().identity = Some(identity.clone());
        Ok(())
    }

    fn load_policy(&self) -> Result<Option<Policy>, StoreError> {
        Ok(self.state.lock().policy.clone())
    }

    fn save_policy(&self, policy: &Policy) -> Result<(), StoreError> {
        self.state.lock().policy = Some(policy.clone());
        Ok(())
    }

    fn refresh_policy(
        &self,
        last_updated: DateTime<Utc>,
        action_id: Option<&str>,
    ) -> Result<(), StoreError> {
        if let Some(policy) = self.state.lock().policy.as_mut() {
            policy.last_updated = last_updated;
            if let Some(id) = action_id {
                policy.action_id = id.to_string();
            }
        }
        Ok(())
    }

    fn set_backoff_interval(&self, task: TaskKind, secs: u64) -> Result<(), StoreError> {
        if let Some(policy) = self.state.lock().policy.as_mut() {
            policy.set_backoff_interval(task, secs);
        }
        Ok(())
    }

    fn init_statistics(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.statistics.is_none() {
            state.statistics = Some(Statistics::default());
        }
        Ok(())
    }

    fn load_statistics(&self) -> Result<Option<Statistics>, StoreError> {
        Ok(self.state.lock().statistics.clone())
    }

    fn increment_checkins(&self) -> Result<(), StoreError> {
        if let Some(stats) = self.state.lock().statistics.as_mut() {
            stats.total_checkins += 1;
        }
        Ok(())
    }

    fn increment_failures(&self) -> Result<(), StoreError> {
        if let Some(stats) = self.state.lock().statistics.as_mut() {
            stats.total_failures += 1;
        }
        Ok(())
    }

    fn adjust_buffer_size(&self, delta: i64) -> Result<(), StoreError> {
        if let Some(stats) = self.state.lock().statistics.as_mut() {
            stats.combined_buffer_size = if delta >= 0 {
                stats.combined_buffer_size.saturating_add(delta as u64)
            } else {
                stats
                    .combined_buffer_size
                    .saturating_sub(delta.unsigned_abs())
            };
        }
        Ok(())
    }

    fn record_shipment(&self, at: DateTime<Utc>, count: usize) -> Result<(), StoreError> {
        if let Some(stats) = self.state.lock().statistics.as_mut() {
            stats.last_shipped_at = Some(at);
            stats.last_shipped_count = count;
        }
        Ok(())
    }

    fn set_health(&self, health: AgentHealth) -> Result<(), StoreError> {
        if let Some(stats) = self.state.lock().statistics.as_mut() {
            stats.agent_health = health;
        }
        Ok(())
    }

    fn load_ack_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.state.lock().ack_token.clone())
    }

    fn save_ack_token(&self, token: Option<&str>) -> Result<(), StoreError> {
        self.state.lock().ack_token = token.map(str::to_string);
        Ok(())
    }
}

impl DocumentQueue for MemoryStore {
    fn append(&self, collector: CollectorKind, body: Value) -> Result<u64, StoreError> {
        let mut state = self.state.lock();
        state.next_seq += 1;
        let seq = state.next_seq;
        state
            .queues
            .entry(collector)
            .or_default()
            .push_back(BufferedDocument {
                seq,
                collector,
                appended_at: Utc::now(),
                body,
            });
        Ok(seq)
    }

    fn peek_oldest(
        &self,
        collector: CollectorKind,
        limit: usize,
    ) -> Result<Vec<BufferedDocument>, StoreError> {
        Ok(self
            .state
            .lock()
            .queues
            .get(&collector)
            .map(|q| q.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn delete_oldest(&self, collector: CollectorKind, limit: usize) -> Result<usize, StoreError> {
        let mut state = self.state.lock();
        let Some(queue) = state.queues.get_mut(&collector) else {
            return Ok(0);
        };
        let n = limit.min(queue.len());
        queue.drain(..n);
        Ok(n)
    }

    fn claim_oldest(
        &self,
        collector: CollectorKind,
        limit: usize,
    ) -> Result<Vec<BufferedDocument>, StoreError> {
        let mut state = self.state.lock();
        let Some(queue) = state.queues.get_mut(&collector) else {
            return Ok(Vec::new());
        };
        let n = limit.min(queue.len());
        Ok(queue.drain(..n).collect())
    }

    fn count(&self, collector: CollectorKind) -> Result<usize, StoreError> {
        Ok(self
            .state
            .lock()
            .queues
            .get(&collector)
            .map(VecDeque::len)
            .unwrap_or(0))
    }
}

impl AgentStore for MemoryStore {
    fn purge_all(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let next_seq = state.next_seq;
        *state = MemoryState {
            next_seq,
            ..MemoryState::default()
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_fifo_drain() {
        let store = MemoryStore::new();
        for n in 1..=3 {
            store
                .append(CollectorKind::Location, json!({ "n": n }))
                .unwrap();
        }

        let claimed = store.claim_oldest(CollectorKind::Location, 2).unwrap();
        let bodies: Vec<_> = claimed.iter().map(|d| d.body["n"].clone()).collect();
        assert_eq!(bodies, vec![json!(1), json!(2)]);

        let rest = store.peek_oldest(CollectorKind::Location, 10).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].body["n"], json!(3));
    }

    #[test]
    fn test_queues_are_independent() {
        let store = MemoryStore::new();
        store.append(CollectorKind::Location, json!({})).unwrap();
        store.append(CollectorKind::SelfLog, json!({})).unwrap();
        store.append(CollectorKind::SelfLog, json!({})).unwrap();

        assert_eq!(store.delete_oldest(CollectorKind::SelfLog, 5).unwrap(), 2);
        assert_eq!(store.count(CollectorKind::SelfLog).unwrap(), 0);
        assert_eq!(store.count(CollectorKind::Location).unwrap(), 1);
        assert_eq!(store.count(CollectorKind::NetworkLogs).unwrap(), 0);
    }

    #[test]
    fn test_statistics_need_init() {
        let store = MemoryStore::new();
        store.increment_checkins().unwrap();
        assert!(store.load_statistics().unwrap().is_none());

        store.init_statistics().unwrap();
        store.increment_checkins().unwrap();
        store.increment_failures().unwrap();
        store.adjust_buffer_size(3).unwrap();
        store.adjust_buffer_size(-5).unwrap();
        store.init_statistics().unwrap();

        let stats = store.load_statistics().unwrap().unwrap();
        assert_eq!(stats.total_checkins, 1);
        assert_eq!(stats.total_failures, 1);
        assert_eq!(stats.combined_buffer_size, 0);
    }

    #[test]
    fn test_refresh_policy_keeps_action_id_without_one() {
        let store = MemoryStore::new();
        let policy = fixtures::policy(3);
        store.save_policy(&policy).unwrap();

        let later = policy.last_updated + chrono::Duration::seconds(30);
        store.refresh_policy(later, None).unwrap();
        let stored = store.load_policy().unwrap().unwrap();
        assert_eq!(stored.action_id, policy.action_id);
        assert_eq!(stored.last_updated, later);

        store.refresh_policy(later, Some("action-2")).unwrap();
        assert_eq!(store.load_policy().unwrap().unwrap().action_id, "action-2");
    }

    #[test]
    fn test_purge_all() {
        let store = MemoryStore::new();
        store.save_identity(&fixtures::identity()).unwrap();
        store.save_policy(&fixtures::policy(1)).unwrap();
        store.init_statistics().unwrap();
        store.save_ack_token(Some("tok")).unwrap();
        store.append(CollectorKind::Location, json!({})).unwrap();

        store.purge_all().unwrap();
        assert!(store.load_identity().unwrap().is_none());
        assert!(store.load_policy().unwrap().is_none());
        assert!(store.load_statistics().unwrap().is_none());
        assert!(store.load_ack_token().unwrap().is_none());
        assert_eq!(store.total_buffered(), 0);

        let seq = store.append(CollectorKind::Location, json!({})).unwrap();
        assert_eq!(seq, 2);
    }

    proptest! {
        #[test]
        fn prop_claim_is_fifo(total in 0usize..40, take in 0usize..50) {
            let store = MemoryStore::new();
            for n in 0..total {
                store.append(CollectorKind::NetworkLogs, json!(n)).unwrap();
            }
            let claimed = store.claim_oldest(CollectorKind::NetworkLogs, take).unwrap();
            let expected: Vec<_> = (0..take.min(total)).map(|n| json!(n)).collect();
            let got: Vec<_> = claimed.into_iter().map(|d| d.body).collect();
            prop_assert_eq!(got, expected);
            prop_assert_eq!(
                store.count(CollectorKind::NetworkLogs).unwrap(),
                total - take.min(total)
            );
        }
    }
}
