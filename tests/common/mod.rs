#![allow(dead_code)]

use std::sync::Arc;

use fleet_agent_core::storage::{Policy, StateStore};
use fleet_agent_core::testing::{fixtures, RecordingScheduler, ScriptedTransport};
use fleet_agent_core::{Agent, AgentConfig, MemoryStore};

pub struct TestAgent {
    pub agent: Agent,
    pub store: Arc<MemoryStore>,
    pub transport: Arc<ScriptedTransport>,
    pub scheduler: Arc<RecordingScheduler>,
}

/// Agent over empty in-memory collaborators.
pub fn fresh() -> TestAgent {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(ScriptedTransport::new());
    let scheduler = Arc::new(RecordingScheduler::new());
    let agent = Agent::new(
        store.clone(),
        transport.clone(),
        scheduler.clone(),
        AgentConfig::default(),
        fixtures::device(),
    )
    .unwrap();
    TestAgent {
        agent,
        store,
        transport,
        scheduler,
    }
}

/// Agent that is already enrolled, optionally with a stored policy.
pub fn enrolled(policy: Option<Policy>) -> TestAgent {
    let t = fresh();
    t.store.save_identity(&fixtures::identity()).unwrap();
    t.store.init_statistics().unwrap();
    if let Some(policy) = policy {
        t.store.save_policy(&policy).unwrap();
    }
    t
}

pub fn stored_policy(t: &TestAgent) -> Policy {
    t.store.load_policy().unwrap().expect("policy stored")
}
