//! Error taxonomy shared by both adapters.
//!
//! - [`DomainError`]: raised by the manager (not-found, invalid request, ...).
//! - [`WrappedError`]: the wire envelope a domain error travels in.
//! - [`TransportError`]: failures of the messaging round trip itself.
//! - [`ConductorError`]: what every conductor operation returns.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::messages::RpcVersion;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Discriminant of a domain error. Callers match on this, never on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    InstanceNotFound,
    InstanceTypeNotFound,
    MigrationNotFound,
    AggregateNotFound,
    AggregateHostExists,
    AggregateHostNotFound,
    AggregateMetadataNotFound,
    BlockDeviceMappingNotFound,
    ComputeHostNotFound,
    InstanceActionNotFound,
    InvalidRequest,
    /// A kind this build does not know, sent by a newer peer.
    Unknown,
}

impl ErrorKind {
    const ALL: [ErrorKind; 11] = [
        ErrorKind::InstanceNotFound,
        ErrorKind::InstanceTypeNotFound,
        ErrorKind::MigrationNotFound,
        ErrorKind::AggregateNotFound,
        ErrorKind::AggregateHostExists,
        ErrorKind::AggregateHostNotFound,
        ErrorKind::AggregateMetadataNotFound,
        ErrorKind::BlockDeviceMappingNotFound,
        ErrorKind::ComputeHostNotFound,
        ErrorKind::InstanceActionNotFound,
        ErrorKind::InvalidRequest,
    ];

    /// Type name carried in `WrappedError::original_type`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InstanceNotFound => "InstanceNotFound",
            ErrorKind::InstanceTypeNotFound => "InstanceTypeNotFound",
            ErrorKind::MigrationNotFound => "MigrationNotFound",
            ErrorKind::AggregateNotFound => "AggregateNotFound",
            ErrorKind::AggregateHostExists => "AggregateHostExists",
            ErrorKind::AggregateHostNotFound => "AggregateHostNotFound",
            ErrorKind::AggregateMetadataNotFound => "AggregateMetadataNotFound",
            ErrorKind::BlockDeviceMappingNotFound => "BlockDeviceMappingNotFound",
            ErrorKind::ComputeHostNotFound => "ComputeHostNotFound",
            ErrorKind::InstanceActionNotFound => "InstanceActionNotFound",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::Unknown => "Unknown",
        }
    }

    /// Parse a type name back into a kind. Unrecognized names map to `Unknown`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .unwrap_or(ErrorKind::Unknown)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// DomainError
// ---------------------------------------------------------------------------

/// An error raised by the manager.
///
/// Two domain errors are equal when type name and message match; the stack
/// holds diagnostic frames (where the error was raised and which hops it
/// crossed) and does not take part in equality.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct DomainError {
    kind: ErrorKind,
    /// Peer's type name when `kind` is `Unknown`, so it can be passed on as received.
    unknown_type: Option<String>,
    message: String,
    stack: Vec<String>,
}

impl DomainError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            unknown_type: None,
            message: message.into(),
            stack: Vec::new(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Type name this error travels under on the wire.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.unknown_type
            .as_deref()
            .unwrap_or_else(|| self.kind.as_str())
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    /// Append a diagnostic frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }

    /// Pack this error into its wire envelope.
    #[must_use]
    pub fn into_wrapped(self) -> WrappedError {
        WrappedError {
            original_type: self.type_name().to_string(),
            original_message: self.message,
            original_stack: self.stack,
        }
    }

    pub fn instance_not_found(instance_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::InstanceNotFound,
            format!("Instance {instance_id} could not be found."),
        )
    }

    pub fn instance_type_not_found(instance_type_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::InstanceTypeNotFound,
            format!("Instance type {instance_type_id} could not be found."),
        )
    }

    pub fn migration_not_found(migration_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::MigrationNotFound,
            format!("Migration {migration_id} could not be found."),
        )
    }

    pub fn aggregate_not_found(aggregate_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::AggregateNotFound,
            format!("Aggregate {aggregate_id} could not be found."),
        )
    }

    pub fn aggregate_host_exists(aggregate_id: impl fmt::Display, host: &str) -> Self {
        Self::new(
            ErrorKind::AggregateHostExists,
            format!("Aggregate {aggregate_id} already has host {host}."),
        )
    }

    pub fn aggregate_host_not_found(aggregate_id: impl fmt::Display, host: &str) -> Self {
        Self::new(
            ErrorKind::AggregateHostNotFound,
            format!("Aggregate {aggregate_id} has no host {host}."),
        )
    }

    pub fn aggregate_metadata_not_found(aggregate_id: impl fmt::Display, key: &str) -> Self {
        Self::new(
            ErrorKind::AggregateMetadataNotFound,
            format!("Aggregate {aggregate_id} has no metadata with key {key}."),
        )
    }

    pub fn block_device_mapping_not_found(bdm_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::BlockDeviceMappingNotFound,
            format!("Block device mapping {bdm_id} could not be found."),
        )
    }

    #[must_use]
    pub fn compute_host_not_found(host: &str) -> Self {
        Self::new(
            ErrorKind::ComputeHostNotFound,
            format!("Compute host {host} could not be found."),
        )
    }

    #[must_use]
    pub fn instance_action_not_found(request_id: &str, instance_uuid: &str) -> Self {
        Self::new(
            ErrorKind::InstanceActionNotFound,
            format!("Action for request_id {request_id} on instance {instance_uuid} not found"),
        )
    }

    #[must_use]
    pub fn invalid_request() -> Self {
        Self::new(ErrorKind::InvalidRequest, "The request is invalid.")
    }

    #[must_use]
    pub fn invalid_request_because(reason: &str) -> Self {
        Self::new(
            ErrorKind::InvalidRequest,
            format!("The request is invalid: {reason}"),
        )
    }
}

impl PartialEq for DomainError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.type_name() == other.type_name()
            && self.message == other.message
    }
}

impl Eq for DomainError {}

// ---------------------------------------------------------------------------
// WrappedError
// ---------------------------------------------------------------------------

/// Wire envelope carrying a domain error across the messaging boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedError {
    pub original_type: String,
    pub original_message: String,
    pub original_stack: Vec<String>,
}

impl WrappedError {
    /// Unpack the original domain error, keeping type, message and stack.
    ///
    /// A type name this build does not know becomes `ErrorKind::Unknown` and
    /// is kept verbatim for the next [`DomainError::into_wrapped`].
    #[must_use]
    pub fn into_domain(self) -> DomainError {
        let kind = ErrorKind::from_name(&self.original_type);
        DomainError {
            kind,
            unknown_type: (kind == ErrorKind::Unknown).then_some(self.original_type),
            message: self.original_message,
            stack: self.original_stack,
        }
    }
}

// ---------------------------------------------------------------------------
// RpcRejection
// ---------------------------------------------------------------------------

/// Reasons a server endpoint refuses to run a call at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RpcRejection {
    #[error("server overloaded, try again later")]
    Overloaded,
    #[error("call exceeded its {timeout_ms}ms deadline on the server")]
    DeadlineExceeded { timeout_ms: u64 },
    #[error("unsupported rpc version {requested}, server speaks {supported}")]
    UnsupportedVersion {
        requested: RpcVersion,
        supported: RpcVersion,
    },
    #[error("malformed request: {detail}")]
    Malformed { detail: String },
    #[error("internal error: {detail}")]
    Internal { detail: String },
}

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Failures of the messaging round trip. Only the remote path produces these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("timed out after {timeout_ms}ms waiting for a reply on topic '{topic}'")]
    Timeout { topic: String, timeout_ms: u64 },
    #[error("no consumers on topic '{topic}'")]
    NoConsumers { topic: String },
    #[error("topic '{topic}' closed before replying")]
    Disconnected { topic: String },
    #[error("request rejected by peer: {0}")]
    Rejected(RpcRejection),
    #[error("failed to encode message: {0}")]
    Encode(String),
    #[error("failed to decode message: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// ConductorError
// ---------------------------------------------------------------------------

/// Error returned by every conductor operation.
#[derive(Debug, thiserror::Error)]
pub enum ConductorError {
    /// A manager error, identical in kind and message across adapters.
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// A domain error still inside its transport envelope.
    #[error("{}: {}", .0.original_type, .0.original_message)]
    Wrapped(WrappedError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ConductorError {
    /// Kind of the underlying domain error, if this is (or wraps) one.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ConductorError::Domain(e) => Some(e.kind()),
            ConductorError::Wrapped(w) => Some(ErrorKind::from_name(&w.original_type)),
            ConductorError::Transport(_) => None,
        }
    }

    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, ConductorError::Transport(_))
    }
}
