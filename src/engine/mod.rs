//! Protocol engines.
//!
//! Each engine runs one cycle against borrowed collaborators:
//! - Enrollment (status probe, enroll, first check-in)
//! - Check-in (heartbeat, action dispatch, policy revision, ack)
//! - Upload (collector lifecycle, buffer drain, bulk PUT)
//! - Teardown (unenroll cleanup)
//!
//! `run_cycle` entry points wrap a run with the battery gate and hand the
//! outcome to the schedule controller.

pub mod checkin;
pub mod context;
pub mod enrollment;
pub mod teardown;
pub mod upload;

pub use checkin::CheckinOutcome;
pub use context::*;
pub use enrollment::{Enrollment, EnrollmentRequest};
pub use upload::UploadOutcome;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::collector::{BufferHandle, Collector, CollectorKind, CollectorRegistry, DocumentEnvelope};
use crate::config::AgentConfig;
use crate::error::{AgentError, CollectorError, ErrorClass};
use crate::logging::LogContext;
use crate::network::metadata::DeviceInfo;
use crate::network::transport::HttpTransport;
use crate::schedule::{JobScheduler, RunOutcome, RunTrigger, ScheduleController, TaskKind};
use crate::storage::models::{AgentIdentity, Policy};
use crate::storage::store::AgentStore;

/// Everything an engine run talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub store: &'a Arc<dyn AgentStore>,
    pub transport: &'a dyn HttpTransport,
    pub scheduler: &'a dyn JobScheduler,
    pub registry: &'a CollectorRegistry,
    pub config: &'a AgentConfig,
    pub device: &'a DeviceInfo,
}

impl<'a> Collaborators<'a> {
    pub fn controller(&self) -> ScheduleController<'a> {
        ScheduleController::new(self.store.as_ref(), self.scheduler)
    }

    /// Fresh collector instance for `kind`, bound to its buffer.
    pub fn instantiate(
        &self,
        kind: CollectorKind,
        identity: &AgentIdentity,
        policy: &Policy,
    ) -> Result<Box<dyn Collector>, CollectorError> {
        let envelope = DocumentEnvelope::new(kind, identity, policy, self.device, self.config);
        self.registry
            .create(kind, BufferHandle::new(Arc::clone(self.store), envelope))
    }

    /// Permissions needed by every collector the policy enables. Unknown
    /// paths are skipped.
    pub fn required_permissions(
        &self,
        identity: &AgentIdentity,
        policy: &Policy,
        ctx: &LogContext,
    ) -> Vec<String> {
        let mut permissions = BTreeSet::new();
        for raw in &policy.collector_paths {
            let path = match self.registry.resolve(raw) {
                Ok(path) => path,
                Err(e) => {
                    log::warn!("{} COLLECTOR_PATH_SKIPPED path={} error={}", ctx, raw, e);
                    continue;
                }
            };
            match self.instantiate(path.kind, identity, policy) {
                Ok(collector) => permissions.extend(collector.required_permissions()),
                Err(e) => log::warn!("{} COLLECTOR_PATH_SKIPPED path={} error={}", ctx, raw, e),
            }
        }
        permissions.into_iter().collect()
    }
}

/// Why a cycle failed, classified for the embedder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleFailure {
    pub class: ErrorClass,
    pub message: String,
}

/// What a scheduled cycle did and when it runs next.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport<T> {
    pub cycle_id: String,
    pub task: TaskKind,
    pub outcome: RunOutcome,
    /// Engine result when the run completed.
    pub detail: Option<T>,
    pub failure: Option<CycleFailure>,
    /// `None` when nothing was armed (no policy stored).
    pub next_run: Option<Duration>,
}

impl<T> CycleReport<T> {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Gate, run and re-arm one scheduled cycle of `task`.
///
/// A low battery skips the run when the stored policy asks for it. Whatever
/// happens, the controller records the outcome and arms the next run.
pub(crate) fn scheduled_cycle<T, E>(
    c: &Collaborators<'_>,
    task: TaskKind,
    trigger: RunTrigger,
    run: impl FnOnce(&CycleContext) -> Result<T, E>,
    outcome_of: impl FnOnce(&T) -> RunOutcome,
) -> CycleReport<T>
where
    E: Into<AgentError>,
{
    let mut ctx = CycleContext::for_task(task);
    if let Ok(Some(identity)) = c.store.load_identity() {
        ctx = ctx.with_agent(&identity.agent_id);
    }
    let log_ctx = ctx.log_context();
    let gated = c
        .store
        .load_policy()
        .ok()
        .flatten()
        .map(|p| p.disable_if_battery_low)
        .unwrap_or(false);

    let (outcome, detail, failure) = if trigger.battery_low && gated {
        log::info!("{} CYCLE_SKIPPED task={} reason=battery_low", log_ctx, task);
        (RunOutcome::Skipped, None, None)
    } else {
        match run(&ctx) {
            Ok(detail) => (outcome_of(&detail), Some(detail), None),
            Err(e) => {
                let e: AgentError = e.into();
                log::warn!(
                    "{} CYCLE_FAILED task={} class={} error={}",
                    log_ctx,
                    task,
                    e.class().as_str(),
                    e
                );
                let failure = CycleFailure {
                    class: e.class(),
                    message: e.to_string(),
                };
                (RunOutcome::Failed, None, Some(failure))
            }
        }
    };

    let next_run = match c.controller().finish(task, outcome, &log_ctx) {
        Ok(next) => next,
        Err(e) => {
            log::error!("{} SCHEDULE_UPDATE_FAILED task={} error={}", log_ctx, task, e);
            None
        }
    };

    CycleReport {
        cycle_id: ctx.cycle_id,
        task,
        outcome,
        detail,
        failure,
        next_run,
    }
}
