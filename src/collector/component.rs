//! Collector capability.
//!
//! A collector turns one device data source into documents in its buffer.
//! Concrete sources live in the embedder; they plug in through the
//! [`CollectorRegistry`](super::CollectorRegistry).

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::document::DocumentEnvelope;
use super::path::{CollectorKind, CollectorPath};
use crate::error::StoreError;
use crate::storage::models::{AgentIdentity, Policy};
use crate::storage::store::AgentStore;

/// Trait for all collectors.
///
/// Instances are created fresh for every cycle and dropped at its end, so
/// anything that must outlive a cycle belongs in the embedder's source.
pub trait Collector: Send {
    fn kind(&self) -> CollectorKind;

    /// Platform permissions the source needs before it can produce anything.
    fn required_permissions(&self) -> Vec<String> {
        Vec::new()
    }

    /// Configure from the policy path (sub-component and query parameters).
    fn setup(
        &mut self,
        identity: &AgentIdentity,
        policy: &Policy,
        path: &CollectorPath,
    ) -> Result<()>;

    /// Pull pending events from the source into the buffer. Event-driven
    /// sources push through [`BufferHandle`] instead and keep the default.
    fn collect_events(&mut self, _identity: &AgentIdentity, _policy: &Policy) -> Result<()> {
        Ok(())
    }

    /// Stop the source; called when the policy no longer lists the collector.
    fn disable(&mut self, _identity: &AgentIdentity, _policy: &Policy) -> Result<()> {
        Ok(())
    }
}

/// Append-only access to one collector's buffer.
#[derive(Clone)]
pub struct BufferHandle {
    store: Arc<dyn AgentStore>,
    envelope: DocumentEnvelope,
}

impl BufferHandle {
    pub fn new(store: Arc<dyn AgentStore>, envelope: DocumentEnvelope) -> Self {
        Self { store, envelope }
    }

    pub fn kind(&self) -> CollectorKind {
        self.envelope.kind()
    }

    /// Wrap `fields` in the document envelope and append it.
    pub fn push(&self, fields: Map<String, Value>) -> Result<u64, StoreError> {
        self.push_at(fields, Utc::now())
    }

    pub fn push_at(
        &self,
        fields: Map<String, Value>,
        timestamp: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let doc = self.envelope.wrap(fields, timestamp);
        let seq = self.store.append(self.kind(), doc)?;
        self.store.adjust_buffer_size(1)?;
        Ok(seq)
    }

    pub fn pending(&self) -> Result<usize, StoreError> {
        self.store.count(self.kind())
    }
}

/// Location sampling settings taken from path parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationSettings {
    pub min_time_ms: u64,
    pub min_distance_meters: u64,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            min_time_ms: 30_000,
            min_distance_meters: 10,
        }
    }
}

impl LocationSettings {
    pub fn from_path(path: &CollectorPath) -> Result<Self> {
        let mut settings = LocationSettings::default();
        for (key, value) in &path.params {
            let parsed: u64 = match value.parse() {
                Ok(n) => n,
                Err(_) => bail!("parameter {}={} in {} is not a number", key, value, path.raw),
            };
            match key.as_str() {
                "minTimeMs" => settings.min_time_ms = parsed,
                "minDistanceMeters" => settings.min_distance_meters = parsed,
                other => bail!("unknown parameter {} in {}", other, path.raw),
            }
        }
        Ok(settings)
    }
}

/// Collector for sources that push events on their own.
///
/// Documents arrive through [`Agent::ingest`](crate::agent::Agent::ingest);
/// this type only validates configuration and reports permissions.
#[derive(Debug, Clone)]
pub struct PassiveCollector {
    kind: CollectorKind,
    location: Option<LocationSettings>,
}

impl PassiveCollector {
    pub fn new(kind: CollectorKind) -> Self {
        Self {
            kind,
            location: None,
        }
    }

    pub fn location_settings(&self) -> Option<LocationSettings> {
        self.location
    }
}

impl Collector for PassiveCollector {
    fn kind(&self) -> CollectorKind {
        self.kind
    }

    fn required_permissions(&self) -> Vec<String> {
        match self.kind {
            CollectorKind::Location => vec![
                "android.permission.ACCESS_FINE_LOCATION".to_string(),
                "android.permission.ACCESS_COARSE_LOCATION".to_string(),
                "android.permission.ACCESS_BACKGROUND_LOCATION".to_string(),
            ],
            // Device-owner privileges cannot be requested at runtime.
            CollectorKind::SecurityLogs | CollectorKind::NetworkLogs | CollectorKind::SelfLog => {
                Vec::new()
            }
        }
    }

    fn setup(
        &mut self,
        _identity: &AgentIdentity,
        _policy: &Policy,
        path: &CollectorPath,
    ) -> Result<()> {
        match self.kind {
            CollectorKind::Location => {
                self.location = Some(LocationSettings::from_path(path)?);
            }
            _ if !path.params.is_empty() => {
                log::debug!(
                    "COLLECTOR_PARAMS_IGNORED collector={} path={}",
                    self.kind,
                    path.raw
                );
            }
            _ => {}
        }
        Ok(())
    }
}
