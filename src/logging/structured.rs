//! Structured logging utilities.
//!
//! Every engine log line starts with the rendered [`LogContext`], followed by
//! a SCREAMING_SNAKE event name and `key=value` pairs:
//!
//! ```text
//! [cycle=checkin-1a2b3c4d] [agent=4f1c...] POLICY_APPLIED decision=replace revision=6
//! ```

use std::fmt;

/// Logging context for one enrollment, check-in or upload cycle.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub cycle_id: String,
    pub agent_id: Option<String>,
}

impl LogContext {
    pub fn new(cycle_id: &str) -> Self {
        Self {
            cycle_id: cycle_id.to_string(),
            agent_id: None,
        }
    }

    pub fn with_agent(&self, agent_id: &str) -> Self {
        Self {
            cycle_id: self.cycle_id.clone(),
            agent_id: Some(agent_id.to_string()),
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.agent_id {
            Some(aid) => write!(f, "[cycle={}] [agent={}]", self.cycle_id, aid),
            None => write!(f, "[cycle={}]", self.cycle_id),
        }
    }
}
