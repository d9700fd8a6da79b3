//! Schedule controller.
//!
//! Turns a cycle outcome into persisted backoff, health and failure counts,
//! then arms the task's next one-shot job. The policy is re-read here, so a
//! revision installed during the cycle is what the next delay is based on.

use std::time::Duration;

use super::backoff::{compute_next_interval, RunOutcome};
use super::jobs::{JobConstraints, JobScheduler, TaskKind};
use crate::error::StoreError;
use crate::logging::LogContext;
use crate::storage::models::{AgentHealth, Policy};
use crate::storage::store::AgentStore;

pub struct ScheduleController<'a> {
    store: &'a dyn AgentStore,
    scheduler: &'a dyn JobScheduler,
}

impl<'a> ScheduleController<'a> {
    pub fn new(store: &'a dyn AgentStore, scheduler: &'a dyn JobScheduler) -> Self {
        Self { store, scheduler }
    }

    pub fn constraints(policy: &Policy) -> JobConstraints {
        JobConstraints {
            requires_network: true,
            battery_not_low: policy.disable_if_battery_low,
        }
    }

    pub fn arm(&self, task: TaskKind, policy: &Policy, secs: u64) -> Duration {
        let delay = Duration::from_secs(secs);
        self.scheduler
            .schedule_once(task, delay, Self::constraints(policy));
        delay
    }

    /// Arm both tasks at their nominal intervals.
    pub fn arm_nominal(&self, policy: &Policy, ctx: &LogContext) {
        for task in TaskKind::ALL {
            let secs = policy.nominal_interval(task);
            self.arm(task, policy, secs);
            log::info!("{} SCHEDULE_ARMED task={} delay_secs={}", ctx, task, secs);
        }
    }

    pub fn cancel_all(&self) {
        self.scheduler.cancel_all();
    }

    /// Record `outcome` for `task` and arm its next run.
    ///
    /// Returns `None` when no policy is stored (unenrolled), in which case
    /// nothing is armed.
    pub fn finish(
        &self,
        task: TaskKind,
        outcome: RunOutcome,
        ctx: &LogContext,
    ) -> Result<Option<Duration>, StoreError> {
        let policy = match self.store.load_policy()? {
            Some(policy) => policy,
            None => {
                log::info!("{} SCHEDULE_STOPPED task={} reason=no_policy", ctx, task);
                return Ok(None);
            }
        };

        let current = policy.backoff_interval(task);
        let nominal = policy.nominal_interval(task);

        let next = match outcome {
            RunOutcome::Succeeded => nominal,
            RunOutcome::Idle if !policy.backoff_on_empty_buffer => nominal,
            RunOutcome::Idle => {
                compute_next_interval(current, nominal, policy.max_backoff_interval, false)
            }
            RunOutcome::Failed => {
                self.store.increment_failures()?;
                if policy.use_backoff {
                    let next =
                        compute_next_interval(current, nominal, policy.max_backoff_interval, false);
                    log::warn!(
                        "{} BACKOFF_INCREASED task={} from_secs={} to_secs={}",
                        ctx,
                        task,
                        current,
                        next
                    );
                    next
                } else {
                    current
                }
            }
            RunOutcome::Quiet | RunOutcome::Skipped => current,
        };

        if next != current {
            self.store.set_backoff_interval(task, next)?;
        }
        self.store
            .set_health(health_for(next == nominal, policy.is_nominal(task.other())))?;

        let delay = self.arm(task, &policy, next);
        log::info!(
            "{} SCHEDULE_ARMED task={} outcome={} delay_secs={}",
            ctx,
            task,
            outcome.as_str(),
            next
        );
        Ok(Some(delay))
    }
}

/// Healthy only while both schedules run at their nominal interval.
fn health_for(task_nominal: bool, other_nominal: bool) -> AgentHealth {
    if task_nominal && other_nominal {
        AgentHealth::Healthy
    } else {
        AgentHealth::Unhealthy
    }
}
