//! Fleet Agent Core - enrollment, check-in and bulk-upload coordination
//!
//! This crate holds the protocol logic of a fleet-managed device agent. The
//! host platform supplies the HTTP client, the durable store, the deferred
//! job scheduler and the data sources; this crate decides what to send, what
//! to persist and when each protocol runs next. The implementation
//! prioritizes:
//!
//! 1. **Durability** - every cycle reads and writes persisted state only
//! 2. **Logging** - every decision point logged with cycle and agent context
//! 3. **Safety** - no panics on malformed server payloads
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `agent` - Facade the host calls into
//! - `engine` - Enrollment, check-in, upload and teardown cycles
//! - `policy` - Policy action parsing, interval codec, revision rule
//! - `schedule` - Backoff computation and one-shot job control
//! - `collector` - Collector paths, capability trait, registry, documents
//! - `network` - Transport seam, fleet and bulk clients, wire types, TLS
//! - `storage` - Persisted records and the store/queue interfaces
//! - `logging` - Structured logging with cycle context, self-log feed
//! - `testing` - In-memory collaborators and fixtures (`testing` feature)

pub mod agent;
pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod network;
pub mod policy;
pub mod schedule;
pub mod storage;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent::{Agent, AgentStatus, TaskReport};
pub use collector::{Collector, CollectorKind, CollectorRegistry};
pub use config::AgentConfig;
pub use engine::{CheckinOutcome, CycleReport, Enrollment, EnrollmentRequest, UploadOutcome};
pub use error::{AgentError, ErrorClass};
pub use network::{DeviceInfo, HttpTransport};
pub use schedule::{JobScheduler, RunOutcome, RunTrigger, TaskKind};
pub use storage::{AgentStore, MemoryStore};

/// Initialize the logger (call once at startup).
///
/// Use [`Agent::install_self_log`] instead when agent log records should
/// also be shipped.
pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_millis()
        .try_init();
}
