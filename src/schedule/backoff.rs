//! Backoff computation.

/// Result of one recurring cycle as far as scheduling is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunOutcome {
    Succeeded,
    Failed,
    /// Upload found nothing to ship.
    Idle,
    /// Succeeded without news (check-in long-poll timed out). Keeps the
    /// working interval.
    Quiet,
    /// The run gate (battery low) held the cycle back.
    Skipped,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::Failed => "failed",
            RunOutcome::Idle => "idle",
            RunOutcome::Quiet => "quiet",
            RunOutcome::Skipped => "skipped",
        }
    }
}

/// Next working interval in seconds.
///
/// Success resets to `nominal`. Failure doubles `current_backoff`, capped at
/// `max_backoff` unless that is zero, and never drops below `nominal`.
/// Callers only invoke the failure branch when the policy enables backoff.
///
/// # Examples
/// ```
/// use fleet_agent_core::schedule::compute_next_interval;
/// assert_eq!(compute_next_interval(60, 60, 3600, false), 120);
/// assert_eq!(compute_next_interval(2400, 60, 3600, false), 3600);
/// assert_eq!(compute_next_interval(3600, 60, 3600, true), 60);
/// ```
pub fn compute_next_interval(
    current_backoff: u64,
    nominal: u64,
    max_backoff: u64,
    succeeded: bool,
) -> u64 {
    if succeeded {
        return nominal;
    }
    let doubled = current_backoff.max(nominal).max(1).saturating_mul(2);
    let capped = if max_backoff > 0 {
        doubled.min(max_backoff)
    } else {
        doubled
    };
    capped.max(nominal)
}
