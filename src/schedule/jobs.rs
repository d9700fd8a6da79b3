//! Job scheduler interface.
//!
//! The host OS owns the actual deferred-job primitive. The agent only ever
//! submits one-shot jobs; each run re-submits its successor.

use std::fmt;
use std::time::Duration;

/// The two recurring protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    Checkin,
    Upload,
}

impl TaskKind {
    pub const ALL: [TaskKind; 2] = [TaskKind::Checkin, TaskKind::Upload];

    /// Unique job name; scheduling a task replaces any pending job with it.
    pub fn job_id(&self) -> &'static str {
        match self {
            TaskKind::Checkin => "fleet-checkin",
            TaskKind::Upload => "bulk-upload",
        }
    }

    pub fn from_job_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.job_id() == id)
    }

    pub fn other(&self) -> TaskKind {
        match self {
            TaskKind::Checkin => TaskKind::Upload,
            TaskKind::Upload => TaskKind::Checkin,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.job_id())
    }
}

/// Preconditions the host scheduler must hold a job back for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobConstraints {
    pub requires_network: bool,
    pub battery_not_low: bool,
}

/// Host conditions at the moment a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunTrigger {
    pub battery_low: bool,
}

impl RunTrigger {
    pub fn battery_low() -> Self {
        Self { battery_low: true }
    }
}

/// Host deferred-job scheduler.
pub trait JobScheduler: Send + Sync {
    /// Arm `task` to run once after `delay`, replacing any pending run.
    fn schedule_once(&self, task: TaskKind, delay: Duration, constraints: JobConstraints);

    /// Drop every pending job the agent owns.
    fn cancel_all(&self);
}
