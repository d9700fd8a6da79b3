//! Error types.
//!
//! One enum per concern, each mapped onto the coarse [`ErrorClass`] taxonomy
//! the scheduler and embedder act on.

use thiserror::Error;

use crate::collector::CollectorKind;

/// Coarse failure taxonomy.
///
/// A stale policy revision is not represented here: it is an ordinary
/// outcome of the revision rule, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Network or timeout. Recoverable, drives backoff.
    Transport,
    /// Malformed or unexpected server payload. Not retried as-is.
    Protocol,
    /// Rejected token or API key. Surfaced, not auto-retried.
    Auth,
    /// Locally invalid input or state. Fatal to the current operation only.
    Validation,
    /// The durable store failed.
    Storage,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transport => "transport",
            ErrorClass::Protocol => "protocol",
            ErrorClass::Auth => "auth",
            ErrorClass::Validation => "validation",
            ErrorClass::Storage => "storage",
        }
    }
}

/// Failure reported by an [`HttpTransport`](crate::network::HttpTransport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("TLS handshake failed: {0}")]
    Tls(String),
    #[error("request body could not be encoded: {0}")]
    Encode(String),
    #[error("transport failure: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

/// Durable store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("record could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A raw policy action is missing something it must carry.
///
/// Variants follow the order the parser validates in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("action carries no data")]
    MissingActionData,
    #[error("action data carries no policy")]
    MissingPolicy,
    #[error("policy has no revision")]
    MissingRevision,
    #[error("policy has no agent protection block")]
    MissingProtection,
    #[error("policy has no inputs")]
    MissingInputs,
    #[error("first input has no streams")]
    MissingStreams,
    #[error("stream has no collector paths")]
    MissingPaths,
    #[error("policy has no outputs")]
    MissingOutputs,
    #[error("output `{output}` is missing `{field}`")]
    IncompleteOutput { output: String, field: &'static str },
    #[error("action id is missing")]
    MissingActionId,
    #[error("field `{field}` must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

/// Collector path and registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectorError {
    #[error("unknown collector path `{0}`")]
    UnknownPath(String),
    #[error("invalid parameters in `{path}`: {reason}")]
    InvalidParams { path: String, reason: String },
    #[error("no collector registered for {0}")]
    NotRegistered(CollectorKind),
    #[error("collector {0} is not enabled by the current policy")]
    Disabled(CollectorKind),
}

/// Enrollment failures, classified for display to whoever started enrollment.
#[derive(Debug, Error)]
pub enum EnrollError {
    #[error("invalid enrollment request: {0}")]
    Validation(String),
    #[error("agent is already enrolled")]
    AlreadyEnrolled,
    #[error("could not communicate with fleet server: {0}")]
    ServerUnreachable(TransportError),
    #[error("fleet server status request failed with HTTP {0}")]
    StatusRequestFailed(u16),
    #[error("fleet server is not healthy (status {0})")]
    ServerUnhealthy(String),
    #[error("fleet server rejected the enrollment token")]
    TokenRejected,
    #[error("enrollment rejected with HTTP {code}: {message}")]
    EnrollmentRejected { code: u16, message: String },
    #[error("enrollment request failed: {0}")]
    EnrollmentUnreachable(TransportError),
    #[error("invalid response from fleet server: {0}")]
    InvalidResponse(String),
    #[error("agent enrolled but initial check-in failed: {0}")]
    InitialCheckin(#[source] CheckinError),
    #[error("agent enrolled but the fleet server delivered no policy")]
    PolicyMissing,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EnrollError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EnrollError::Validation(_) | EnrollError::AlreadyEnrolled => ErrorClass::Validation,
            EnrollError::ServerUnreachable(_) | EnrollError::EnrollmentUnreachable(_) => {
                ErrorClass::Transport
            }
            EnrollError::TokenRejected => ErrorClass::Auth,
            EnrollError::StatusRequestFailed(_)
            | EnrollError::ServerUnhealthy(_)
            | EnrollError::EnrollmentRejected { .. }
            | EnrollError::InvalidResponse(_)
            | EnrollError::PolicyMissing => ErrorClass::Protocol,
            EnrollError::InitialCheckin(e) => e.class(),
            EnrollError::Store(_) => ErrorClass::Storage,
        }
    }
}

/// Check-in cycle failures.
#[derive(Debug, Error)]
pub enum CheckinError {
    #[error("agent is not enrolled")]
    NotEnrolled,
    #[error("fleet server rejected the agent credentials")]
    TokenOrAuthRejected,
    #[error("check-in rejected with HTTP {code}: {message}")]
    CheckinRejected { code: u16, message: String },
    #[error("check-in request failed: {0}")]
    Transport(TransportError),
    #[error("malformed check-in response: {0}")]
    MalformedResponse(String),
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("policy rejected: {0}")]
    Policy(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CheckinError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CheckinError::NotEnrolled => ErrorClass::Validation,
            CheckinError::TokenOrAuthRejected => ErrorClass::Auth,
            CheckinError::Transport(_) => ErrorClass::Transport,
            CheckinError::CheckinRejected { .. }
            | CheckinError::MalformedResponse(_)
            | CheckinError::UnknownAction(_)
            | CheckinError::Policy(_) => ErrorClass::Protocol,
            CheckinError::Store(_) => ErrorClass::Storage,
        }
    }
}

/// Upload cycle failures.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("agent is not enrolled")]
    NotEnrolled,
    #[error("no policy stored")]
    PolicyMissing,
    #[error("output `{0}` lists no hosts")]
    NoHosts(String),
    #[error("bulk request failed: {0}")]
    Transport(TransportError),
    #[error("bulk request rejected with HTTP {code}: {message}")]
    Rejected { code: u16, message: String },
    #[error("bulk body could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UploadError {
    pub fn class(&self) -> ErrorClass {
        match self {
            UploadError::NotEnrolled | UploadError::PolicyMissing | UploadError::NoHosts(_) => {
                ErrorClass::Validation
            }
            UploadError::Transport(_) => ErrorClass::Transport,
            UploadError::Rejected { code, .. } if *code == 401 || *code == 403 => ErrorClass::Auth,
            UploadError::Rejected { .. } | UploadError::Encode(_) => ErrorClass::Protocol,
            UploadError::Store(_) => ErrorClass::Storage,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("configuration could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Crate-level error for the [`Agent`](crate::agent::Agent) facade.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Enroll(#[from] EnrollError),
    #[error(transparent)]
    Checkin(#[from] CheckinError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Collector(#[from] CollectorError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("agent is not enrolled")]
    NotEnrolled,
}

impl AgentError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AgentError::Enroll(e) => e.class(),
            AgentError::Checkin(e) => e.class(),
            AgentError::Upload(e) => e.class(),
            AgentError::Collector(_) | AgentError::Config(_) | AgentError::NotEnrolled => {
                ErrorClass::Validation
            }
            AgentError::Store(_) => ErrorClass::Storage,
        }
    }
}
