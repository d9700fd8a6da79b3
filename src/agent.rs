//! Agent facade.
//!
//! Owns the collaborators the embedder supplies and exposes the operations a
//! host calls: enroll, run a fired job, ingest collector output, unenroll and
//! report status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::collector::{BufferHandle, CollectorKind, CollectorRegistry, DocumentEnvelope};
use crate::config::AgentConfig;
use crate::engine::{
    checkin, enrollment, teardown, upload, CheckinOutcome, Collaborators, CycleContext,
    CycleReport, Enrollment, EnrollmentRequest, UploadOutcome,
};
use crate::error::{AgentError, CollectorError, ConfigError, StoreError};
use crate::logging::init_with_self_log;
use crate::network::metadata::DeviceInfo;
use crate::network::transport::HttpTransport;
use crate::schedule::{JobScheduler, RunTrigger, TaskKind};
use crate::storage::models::{AgentIdentity, Policy, Statistics};
use crate::storage::store::AgentStore;

/// Report of one fired job.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskReport {
    Checkin(CycleReport<CheckinOutcome>),
    Upload(CycleReport<UploadOutcome>),
}

/// Snapshot for the embedder's status screen.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentStatus {
    pub identity: Option<AgentIdentity>,
    pub policy: Option<Policy>,
    pub statistics: Option<Statistics>,
    pub buffered: Vec<(CollectorKind, usize)>,
}

impl AgentStatus {
    pub fn enrolled(&self) -> bool {
        self.identity.is_some()
    }

    pub fn total_buffered(&self) -> usize {
        self.buffered.iter().map(|(_, n)| n).sum()
    }
}

pub struct Agent {
    store: Arc<dyn AgentStore>,
    transport: Arc<dyn HttpTransport>,
    scheduler: Arc<dyn JobScheduler>,
    registry: CollectorRegistry,
    config: AgentConfig,
    device: DeviceInfo,
}

impl Agent {
    pub fn new(
        store: Arc<dyn AgentStore>,
        transport: Arc<dyn HttpTransport>,
        scheduler: Arc<dyn JobScheduler>,
        config: AgentConfig,
        device: DeviceInfo,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            transport,
            scheduler,
            registry: CollectorRegistry::with_defaults(),
            config,
            device,
        })
    }

    /// Replace the default passive collectors.
    pub fn with_registry(mut self, registry: CollectorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn AgentStore> {
        &self.store
    }

    fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            store: &self.store,
            transport: self.transport.as_ref(),
            scheduler: self.scheduler.as_ref(),
            registry: &self.registry,
            config: &self.config,
            device: &self.device,
        }
    }

    pub fn is_enrolled(&self) -> Result<bool, StoreError> {
        Ok(self.store.load_identity()?.is_some())
    }

    pub fn enroll(&self, request: &EnrollmentRequest) -> Result<Enrollment, AgentError> {
        Ok(enrollment::enroll(&self.collaborators(), request)?)
    }

    pub fn run_checkin(&self, trigger: RunTrigger) -> CycleReport<CheckinOutcome> {
        checkin::run_cycle(&self.collaborators(), trigger)
    }

    pub fn run_upload(&self, trigger: RunTrigger) -> CycleReport<UploadOutcome> {
        upload::run_cycle(&self.collaborators(), trigger)
    }

    pub fn run(&self, task: TaskKind, trigger: RunTrigger) -> TaskReport {
        match task {
            TaskKind::Checkin => TaskReport::Checkin(self.run_checkin(trigger)),
            TaskKind::Upload => TaskReport::Upload(self.run_upload(trigger)),
        }
    }

    /// Run the job the host scheduler fired under `job_id`.
    pub fn run_job(&self, job_id: &str, trigger: RunTrigger) -> Option<TaskReport> {
        match TaskKind::from_job_id(job_id) {
            Some(task) => Some(self.run(task, trigger)),
            None => {
                log::warn!("UNKNOWN_JOB job_id={}", job_id);
                None
            }
        }
    }

    /// Append collector output to the buffer of `kind`.
    pub fn ingest(&self, kind: CollectorKind, fields: Map<String, Value>) -> Result<u64, AgentError> {
        self.ingest_at(kind, fields, Utc::now())
    }

    pub fn ingest_at(
        &self,
        kind: CollectorKind,
        fields: Map<String, Value>,
        timestamp: DateTime<Utc>,
    ) -> Result<u64, AgentError> {
        let identity = self.store.load_identity()?.ok_or(AgentError::NotEnrolled)?;
        let policy = self.store.load_policy()?.ok_or(AgentError::NotEnrolled)?;
        if !policy.enables_path(kind.path_name()) {
            return Err(CollectorError::Disabled(kind).into());
        }
        let envelope = DocumentEnvelope::new(kind, &identity, &policy, &self.device, &self.config);
        let buffer = BufferHandle::new(Arc::clone(&self.store), envelope);
        Ok(buffer.push_at(fields, timestamp)?)
    }

    /// Cancel all jobs and wipe every persisted record.
    pub fn unenroll(&self) -> Result<(), AgentError> {
        let mut ctx = CycleContext::new("unenroll");
        if let Some(identity) = self.store.load_identity()? {
            ctx = ctx.with_agent(&identity.agent_id);
        }
        teardown::unenroll(&self.collaborators(), &ctx.log_context())?;
        Ok(())
    }

    pub fn status(&self) -> Result<AgentStatus, StoreError> {
        let mut buffered = Vec::with_capacity(CollectorKind::ALL.len());
        for kind in CollectorKind::ALL {
            buffered.push((kind, self.store.count(kind)?));
        }
        Ok(AgentStatus {
            identity: self.store.load_identity()?,
            policy: self.store.load_policy()?,
            statistics: self.store.load_statistics()?,
            buffered,
        })
    }

    /// Install the global logger with self-log forwarding into this agent's
    /// store.
    pub fn install_self_log(&self) -> Result<(), AgentError> {
        init_with_self_log(
            Arc::clone(&self.store),
            self.device.clone(),
            self.config.clone(),
        )
    }
}
