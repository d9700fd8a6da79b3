//! Cycle context management.
//!
//! Every enrollment, check-in and upload run gets a short id so its log
//! lines can be grouped.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::logging::structured::LogContext;
use crate::schedule::jobs::TaskKind;

/// Context for one engine run.
#[derive(Debug, Clone)]
pub struct CycleContext {
    pub cycle_id: String,
    pub started_at: DateTime<Utc>,
    pub agent_id: Option<String>,
}

impl CycleContext {
    pub fn new(label: &str) -> Self {
        let cycle_id = format!("{}-{}", label, &Uuid::new_v4().to_string()[..8]);
        Self {
            cycle_id,
            started_at: Utc::now(),
            agent_id: None,
        }
    }

    pub fn for_task(task: TaskKind) -> Self {
        Self::new(match task {
            TaskKind::Checkin => "checkin",
            TaskKind::Upload => "upload",
        })
    }

    pub fn with_agent(mut self, agent_id: &str) -> Self {
        self.agent_id = Some(agent_id.to_string());
        self
    }

    pub fn log_context(&self) -> LogContext {
        let ctx = LogContext::new(&self.cycle_id);
        match &self.agent_id {
            Some(agent_id) => ctx.with_agent(agent_id),
            None => ctx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_ids() {
        let ctx = CycleContext::for_task(TaskKind::Upload);
        assert!(ctx.cycle_id.starts_with("upload-"));
        assert_eq!(ctx.cycle_id.len(), "upload-".len() + 8);
        assert_ne!(ctx.cycle_id, CycleContext::for_task(TaskKind::Upload).cycle_id);

        let with_agent = ctx.with_agent("agent-1");
        assert!(format!("{}", with_agent.log_context()).ends_with("[agent=agent-1]"));
    }
}
