//! Interval codec.
//!
//! Fleet policies carry durations as strings like `"30s"`, `"5m"` or
//! `"1h30m"`. Parsing never fails: anything that does not yield a positive
//! number of seconds falls back to [`DEFAULT_INTERVAL_SECS`].

use lazy_static::lazy_static;
use regex::Regex;

/// Fallback for missing, malformed or zero-length intervals.
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;

lazy_static! {
    static ref INTERVAL_PART: Regex = Regex::new(r"(\d+)([wdhms])").unwrap();
}

/// Parse an interval string into seconds.
///
/// Every `<digits><unit>` group is summed, so `"1h30m"` is 5400. Text between
/// groups is ignored. A result of zero (including `"0s"`, `"30"` with no unit
/// and `"5x"`) is logged and replaced with the default.
///
/// # Examples
/// ```
/// use fleet_agent_core::policy::parse_interval;
/// assert_eq!(parse_interval("5m"), 300);
/// assert_eq!(parse_interval("1h30m"), 5400);
/// assert_eq!(parse_interval("soon"), 60);
/// ```
pub fn parse_interval(raw: &str) -> u64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        log::warn!("INTERVAL_EMPTY default_secs={}", DEFAULT_INTERVAL_SECS);
        return DEFAULT_INTERVAL_SECS;
    }

    let mut total: u64 = 0;
    for caps in INTERVAL_PART.captures_iter(trimmed) {
        let amount: u64 = match caps[1].parse() {
            Ok(n) => n,
            Err(_) => continue,
        };
        let unit = match &caps[2] {
            "w" => WEEK,
            "d" => DAY,
            "h" => HOUR,
            "m" => MINUTE,
            _ => 1,
        };
        total = total.saturating_add(amount.saturating_mul(unit));
    }

    if total == 0 {
        log::warn!(
            "INTERVAL_UNRECOGNIZED raw={:?} default_secs={}",
            raw,
            DEFAULT_INTERVAL_SECS
        );
        return DEFAULT_INTERVAL_SECS;
    }
    total
}

/// [`parse_interval`] for a field that may be absent.
pub fn parse_optional_interval(raw: Option<&str>) -> u64 {
    match raw {
        Some(s) => parse_interval(s),
        None => {
            log::warn!("INTERVAL_MISSING default_secs={}", DEFAULT_INTERVAL_SECS);
            DEFAULT_INTERVAL_SECS
        }
    }
}

/// Render seconds back into the compact unit form, largest unit first.
///
/// `format_interval(0)` is `"0s"`.
pub fn format_interval(secs: u64) -> String {
    if secs == 0 {
        return "0s".to_string();
    }
    let mut rest = secs;
    let mut out = String::new();
    for (unit, suffix) in [(WEEK, 'w'), (DAY, 'd'), (HOUR, 'h'), (MINUTE, 'm'), (1, 's')] {
        let n = rest / unit;
        if n > 0 {
            out.push_str(&n.to_string());
            out.push(suffix);
            rest %= unit;
        }
    }
    out
}
