//! Unenroll cleanup.

use super::Collaborators;
use crate::error::StoreError;
use crate::logging::LogContext;

/// Cancel every pending job, then drop identity, policy, statistics, the
/// ack token and all buffers.
pub fn unenroll(c: &Collaborators<'_>, ctx: &LogContext) -> Result<(), StoreError> {
    c.controller().cancel_all();
    c.store.purge_all()?;
    log::info!("{} AGENT_UNENROLLED", ctx);
    Ok(())
}
