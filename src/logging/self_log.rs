//! Self-log forwarding.
//!
//! Wraps the `env_logger` backend and mirrors records at or above the
//! configured threshold into the `self-log` collector buffer, as long as the
//! agent is enrolled and its policy lists that collector.

use std::cell::Cell;
use std::sync::Arc;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::collector::{self_log_fields, CollectorKind, DocumentEnvelope};
use crate::config::AgentConfig;
use crate::error::{ConfigError, StoreError};
use crate::network::metadata::DeviceInfo;
use crate::storage::store::AgentStore;

thread_local! {
    // Store implementations may log; records emitted while forwarding are
    // not forwarded again.
    static FORWARDING: Cell<bool> = Cell::new(false);
}

pub struct SelfLogForwarder {
    inner: env_logger::Logger,
    store: Arc<dyn AgentStore>,
    device: DeviceInfo,
    config: AgentConfig,
    threshold: LevelFilter,
}

impl SelfLogForwarder {
    pub fn new(
        inner: env_logger::Logger,
        store: Arc<dyn AgentStore>,
        device: DeviceInfo,
        config: AgentConfig,
    ) -> Result<Self, ConfigError> {
        let threshold = config.self_log_filter()?;
        Ok(Self {
            inner,
            store,
            device,
            config,
            threshold,
        })
    }

    /// Install as the global logger.
    pub fn install(self) -> Result<(), SetLoggerError> {
        log::set_max_level(self.inner.filter().max(self.threshold));
        log::set_boxed_logger(Box::new(self))
    }

    /// Append `record` to the self-log buffer. Returns whether it was
    /// buffered.
    pub fn forward(&self, record: &Record) -> Result<bool, StoreError> {
        if record.level() > self.threshold {
            return Ok(false);
        }
        let Some(identity) = self.store.load_identity()? else {
            return Ok(false);
        };
        let Some(policy) = self.store.load_policy()? else {
            return Ok(false);
        };
        if !policy.enables_path(CollectorKind::SelfLog.path_name()) {
            return Ok(false);
        }

        let envelope = DocumentEnvelope::new(
            CollectorKind::SelfLog,
            &identity,
            &policy,
            &self.device,
            &self.config,
        );
        let fields = self_log_fields(record.level(), record.target(), &record.args().to_string());
        self.store
            .append(CollectorKind::SelfLog, envelope.wrap(fields, chrono::Utc::now()))?;
        self.store.adjust_buffer_size(1)?;
        Ok(true)
    }
}

impl Log for SelfLogForwarder {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata) || metadata.level() <= self.threshold
    }

    fn log(&self, record: &Record) {
        if self.inner.matches(record) {
            self.inner.log(record);
        }
        if FORWARDING.with(Cell::get) {
            return;
        }
        FORWARDING.with(|f| f.set(true));
        // Dropped records cannot be reported through the logger itself.
        let _ = self.forward(record);
        FORWARDING.with(|f| f.set(false));
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install `env_logger` with self-log forwarding for `store`.
pub fn init_with_self_log(
    store: Arc<dyn AgentStore>,
    device: DeviceInfo,
    config: AgentConfig,
) -> Result<(), crate::error::AgentError> {
    let inner = env_logger::builder()
        .filter_level(LevelFilter::Info)
        .format_timestamp_millis()
        .build();
    let forwarder = SelfLogForwarder::new(inner, store, device, config)?;
    if forwarder.install().is_err() {
        log::debug!("SELF_LOG_NOT_INSTALLED reason=logger_already_set");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DocumentQueue, MemoryStore, StateStore};
    use crate::testing::fixtures;

    fn forwarder(store: Arc<MemoryStore>, level: &str) -> SelfLogForwarder {
        let config = AgentConfig {
            self_log_level: level.to_string(),
            ..AgentConfig::default()
        };
        let inner = env_logger::builder().filter_level(LevelFilter::Off).build();
        SelfLogForwarder::new(inner, store, fixtures::device(), config).unwrap()
    }

    fn enrolled_store(paths: &[&str]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.save_identity(&fixtures::identity()).unwrap();
        let mut policy = fixtures::policy(1);
        policy.collector_paths = paths.iter().map(|p| p.to_string()).collect();
        store.save_policy(&policy).unwrap();
        store.init_statistics().unwrap();
        store
    }

    fn record_at(level: log::Level, f: impl FnOnce(&Record)) {
        f(&Record::builder()
            .level(level)
            .target("fleet_agent_core::engine")
            .args(format_args!("check-in finished"))
            .build());
    }

    #[test]
    fn test_forwards_when_enabled() {
        let store = enrolled_store(&["android://self-log"]);
        let fwd = forwarder(store.clone(), "info");

        record_at(log::Level::Warn, |r| assert!(fwd.forward(r).unwrap()));
        record_at(log::Level::Debug, |r| assert!(!fwd.forward(r).unwrap()));

        let docs = store.peek_oldest(CollectorKind::SelfLog, 10).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].body["message"], "check-in finished");
        assert_eq!(docs[0].body["log.level"], "warn");
        assert_eq!(
            store.load_statistics().unwrap().unwrap().combined_buffer_size,
            1
        );
    }

    #[test]
    fn test_skips_when_policy_lacks_self_log() {
        let store = enrolled_store(&["android://location"]);
        let fwd = forwarder(store.clone(), "trace");
        record_at(log::Level::Error, |r| assert!(!fwd.forward(r).unwrap()));
        assert_eq!(store.count(CollectorKind::SelfLog).unwrap(), 0);
    }

    #[test]
    fn test_skips_when_not_enrolled() {
        let store = Arc::new(MemoryStore::new());
        let fwd = forwarder(store, "trace");
        record_at(log::Level::Error, |r| assert!(!fwd.forward(r).unwrap()));
    }
}
