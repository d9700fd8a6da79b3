//! Upload engine.
//!
//! Drains collector buffers into one bulk request:
//! 1. Disable registered collectors the policy no longer lists
//! 2. Set up each listed collector with its path parameters, let it collect
//! 3. Claim up to `max_documents_per_request` oldest documents per buffer
//! 4. PUT the NDJSON body to the policy output
//!
//! Documents are claimed before sending and are not restored when the
//! request fails, so delivery is at most once.

use std::collections::BTreeSet;

use chrono::Utc;

use super::context::CycleContext;
use super::{scheduled_cycle, Collaborators, CycleReport};
use crate::error::UploadError;
use crate::logging::LogContext;
use crate::network::bulk::{encode_bulk_body, BulkClient};
use crate::network::wire::BulkResponse;
use crate::schedule::{RunOutcome, RunTrigger, TaskKind};
use crate::storage::models::{AgentIdentity, BufferedDocument, Policy};

/// What a completed upload did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Shipped {
        count: usize,
        index: String,
        /// Items the bulk response reported as failed.
        rejected_items: usize,
    },
    /// Nothing was buffered; no request was sent.
    Empty,
}

impl UploadOutcome {
    pub fn run_outcome(&self) -> RunOutcome {
        match self {
            UploadOutcome::Shipped { .. } => RunOutcome::Succeeded,
            UploadOutcome::Empty => RunOutcome::Idle,
        }
    }
}

pub fn run(c: &Collaborators<'_>, ctx: &CycleContext) -> Result<UploadOutcome, UploadError> {
    let identity = c.store.load_identity()?.ok_or(UploadError::NotEnrolled)?;
    let policy = c.store.load_policy()?.ok_or(UploadError::PolicyMissing)?;
    if policy.output.hosts.is_empty() {
        return Err(UploadError::NoHosts(policy.output.name.clone()));
    }
    let log_ctx = ctx.log_context().with_agent(&identity.agent_id);

    disable_unlisted(c, &identity, &policy, &log_ctx);
    let documents = drain_listed(c, &identity, &policy, &log_ctx)?;

    if documents.is_empty() {
        log::debug!("{} UPLOAD_EMPTY", log_ctx);
        return Ok(UploadOutcome::Empty);
    }

    let count = documents.len();
    c.store.adjust_buffer_size(-(count as i64))?;
    let body = encode_bulk_body(&documents)?;
    let index = policy.target_index();
    log::info!(
        "{} UPLOAD_SENDING documents={} index={} bytes={}",
        log_ctx,
        count,
        index,
        body.len()
    );

    let response = BulkClient::new(c.transport, c.config)
        .put_bulk(&policy.output, &index, &body)
        .map_err(|e| {
            log::warn!("{} UPLOAD_FAILED dropped={} error={}", log_ctx, count, e);
            UploadError::Transport(e)
        })?;

    if !response.is_success() {
        let message = response
            .error_message()
            .unwrap_or_else(|| format!("HTTP {}", response.status));
        log::warn!(
            "{} UPLOAD_REJECTED status={} dropped={} message={}",
            log_ctx,
            response.status,
            count,
            message
        );
        return Err(UploadError::Rejected {
            code: response.status,
            message,
        });
    }

    c.store.record_shipment(Utc::now(), count)?;

    let rejected_items = match response.json::<BulkResponse>() {
        Ok(bulk) if bulk.errors => bulk.failed_items(),
        Ok(_) => 0,
        Err(e) => {
            log::debug!("{} BULK_RESPONSE_UNREADABLE error={}", log_ctx, e);
            0
        }
    };
    if rejected_items > 0 {
        log::warn!(
            "{} BULK_PARTIAL_FAILURE failed_items={} documents={}",
            log_ctx,
            rejected_items,
            count
        );
    }

    log::info!("{} UPLOAD_SHIPPED documents={} index={}", log_ctx, count, index);
    Ok(UploadOutcome::Shipped {
        count,
        index,
        rejected_items,
    })
}

/// Run a scheduled upload: honor the battery gate, run, re-arm.
pub fn run_cycle(c: &Collaborators<'_>, trigger: RunTrigger) -> CycleReport<UploadOutcome> {
    scheduled_cycle(
        c,
        TaskKind::Upload,
        trigger,
        |ctx| run(c, ctx),
        UploadOutcome::run_outcome,
    )
}

fn disable_unlisted(
    c: &Collaborators<'_>,
    identity: &AgentIdentity,
    policy: &Policy,
    ctx: &LogContext,
) {
    for kind in c.registry.kinds() {
        if policy.enables_path(kind.path_name()) {
            continue;
        }
        let result = c
            .instantiate(kind, identity, policy)
            .map_err(anyhow::Error::from)
            .and_then(|mut collector| collector.disable(identity, policy));
        match result {
            Ok(()) => log::debug!("{} COLLECTOR_DISABLED collector={}", ctx, kind),
            Err(e) => log::warn!("{} COLLECTOR_DISABLE_FAILED collector={} error={}", ctx, kind, e),
        }
    }
}

fn drain_listed(
    c: &Collaborators<'_>,
    identity: &AgentIdentity,
    policy: &Policy,
    ctx: &LogContext,
) -> Result<Vec<BufferedDocument>, UploadError> {
    let mut drained = BTreeSet::new();
    let mut documents = Vec::new();

    for raw in &policy.collector_paths {
        let path = match c.registry.resolve(raw) {
            Ok(path) => path,
            Err(e) => {
                log::warn!("{} COLLECTOR_PATH_SKIPPED path={} error={}", ctx, raw, e);
                continue;
            }
        };
        if !drained.insert(path.kind) {
            continue;
        }

        let mut collector = match c.instantiate(path.kind, identity, policy) {
            Ok(collector) => collector,
            Err(e) => {
                log::warn!("{} COLLECTOR_PATH_SKIPPED path={} error={}", ctx, raw, e);
                continue;
            }
        };
        if let Err(e) = collector.setup(identity, policy, &path) {
            log::warn!(
                "{} COLLECTOR_SETUP_FAILED collector={} error={:#}",
                ctx,
                path.kind,
                e
            );
            continue;
        }
        if let Err(e) = collector.collect_events(identity, policy) {
            log::warn!(
                "{} COLLECTOR_COLLECT_FAILED collector={} error={:#}",
                ctx,
                path.kind,
                e
            );
        }

        let claimed = c
            .store
            .claim_oldest(path.kind, policy.max_documents_per_request)?;
        log::debug!(
            "{} BUFFER_CLAIMED collector={} documents={}",
            ctx,
            path.kind,
            claimed.len()
        );
        documents.extend(claimed);
    }
    Ok(documents)
}
