//! Collector path strings.
//!
//! A policy path is `<scheme>://<kind>[.<sub-component>][?k=v&k=v]`, e.g.
//! `android://location.fused?minTimeMs=1000&minDistanceMeters=10`. The part
//! before the first `.` or `?` selects the collector kind.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CollectorError;

/// Closed set of collector kinds the agent knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollectorKind {
    SelfLog,
    SecurityLogs,
    NetworkLogs,
    Location,
}

impl CollectorKind {
    pub const ALL: [CollectorKind; 4] = [
        CollectorKind::SelfLog,
        CollectorKind::SecurityLogs,
        CollectorKind::NetworkLogs,
        CollectorKind::Location,
    ];

    /// Path key as it appears in policies.
    pub fn path_name(&self) -> &'static str {
        match self {
            CollectorKind::SelfLog => "android://self-log",
            CollectorKind::SecurityLogs => "android://security-logs",
            CollectorKind::NetworkLogs => "android://network-logs",
            CollectorKind::Location => "android://location",
        }
    }

    pub fn from_path_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.path_name() == name)
    }

    /// Short name used in `event.dataset` and log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectorKind::SelfLog => "self-log",
            CollectorKind::SecurityLogs => "security-logs",
            CollectorKind::NetworkLogs => "network-logs",
            CollectorKind::Location => "location",
        }
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed policy path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorPath {
    pub kind: CollectorKind,
    pub sub_component: Option<String>,
    pub params: BTreeMap<String, String>,
    pub raw: String,
}

impl CollectorPath {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

impl FromStr for CollectorPath {
    type Err = CollectorError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let (locator, query) = match raw.split_once('?') {
            Some((locator, query)) => (locator, Some(query)),
            None => (raw, None),
        };

        // The scheme separator contains no dot, so the first dot after it
        // starts the sub-component.
        let (name, sub_component) = match locator.find("://") {
            Some(scheme_end) => match locator[scheme_end + 3..].split_once('.') {
                Some((kind, sub)) => (&locator[..scheme_end + 3 + kind.len()], Some(sub)),
                None => (locator, None),
            },
            None => (locator, None),
        };

        let kind = CollectorKind::from_path_name(name)
            .ok_or_else(|| CollectorError::UnknownPath(raw.to_string()))?;

        let mut params = BTreeMap::new();
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            for pair in query.split('&') {
                match pair.split_once('=') {
                    Some((k, v)) if !k.is_empty() => {
                        params.insert(k.to_string(), v.to_string());
                    }
                    _ => {
                        return Err(CollectorError::InvalidParams {
                            path: raw.to_string(),
                            reason: format!("`{}` is not a key=value pair", pair),
                        })
                    }
                }
            }
        }

        Ok(CollectorPath {
            kind,
            sub_component: sub_component.filter(|s| !s.is_empty()).map(str::to_string),
            params,
            raw: raw.to_string(),
        })
    }
}
