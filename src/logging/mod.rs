//! Structured logging with cycle context.
//!
//! Provides the log context that carries the cycle id and agent
//! id in every log message, and the forwarder that feeds the agent's own log
//! into the self-log collector.

pub mod self_log;
pub mod structured;

pub use self_log::*;
pub use structured::*;
