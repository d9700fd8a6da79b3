//! Revision rule.
//!
//! A policy is only ever replaced by a strictly higher revision. An equal or
//! lower revision is a stale delivery: the stored record keeps everything
//! except its freshness stamp and the id of the action that last carried it.

use crate::storage::models::Policy;

/// What applying an incoming policy does to the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionDecision {
    /// Nothing stored yet.
    Install,
    /// Strictly higher revision, full replace.
    Replace { previous: u64 },
    /// Equal or lower revision, refresh only.
    Stale { stored: u64 },
}

impl RevisionDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionDecision::Install => "install",
            RevisionDecision::Replace { .. } => "replace",
            RevisionDecision::Stale { .. } => "stale",
        }
    }
}

pub fn decide(current: Option<&Policy>, incoming: &Policy) -> RevisionDecision {
    match current {
        None => RevisionDecision::Install,
        Some(stored) if incoming.revision > stored.revision => RevisionDecision::Replace {
            previous: stored.revision,
        },
        Some(stored) => RevisionDecision::Stale {
            stored: stored.revision,
        },
    }
}
