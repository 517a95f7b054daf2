//! Common error types used across the workspace.
//!
//! Each layer defines typed leaf errors and converts them into
//! [`DeviceHubError`] via `#[from]`. Adapters box their own errors into
//! [`DeviceHubError::Storage`].

use crate::device::DeviceType;
use crate::version::RowVersion;

/// Top-level error returned by services and repository ports.
#[derive(Debug, thiserror::Error)]
pub enum DeviceHubError {
    /// Bad, missing, or malformed input. Never retried.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A domain rule forbids the requested behaviour in the current state.
    #[error("precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    /// The requested record does not exist.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// The supplied row version is stale; the caller must re-read and retry.
    #[error("{0}")]
    Conflict(#[from] ConcurrencyConflictError),

    /// A stored record does not match any known shape.
    #[error("data integrity error: {0}")]
    DataIntegrity(#[from] DataIntegrityError),

    /// I/O failure inside the persistence layer.
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Input or invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("field `{0}` is required")]
    MissingField(&'static str),

    #[error("request body is malformed: {0}")]
    MalformedBody(String),

    #[error("a device with id `{0}` already exists")]
    DuplicateId(String),

    #[error("field `name` must not be empty")]
    EmptyName,

    #[error("field `name` must be at most {max} characters, got {actual}")]
    NameTooLong { max: usize, actual: usize },

    #[error("unknown device type `{0}`")]
    UnknownDeviceType(String),

    #[error("invalid id `{id}` for {device_type}: expected it to contain `{marker}`")]
    InvalidId {
        id: String,
        device_type: DeviceType,
        marker: &'static str,
    },

    #[error("invalid IPv4 address `{0}`")]
    InvalidIpAddress(String),

    #[error("field `networkName` must not be empty")]
    EmptyNetworkName,

    #[error("field `rowVersion` is required for edits")]
    MissingRowVersion,

    #[error("field `rowVersion` is not a valid version token")]
    InvalidRowVersion,

    #[error("body id `{body}` does not match path id `{path}`")]
    IdMismatch { path: String, body: String },

    #[error("device type is immutable: stored {stored}, requested {requested}")]
    TypeChanged {
        stored: DeviceType,
        requested: DeviceType,
    },
}

/// Domain behaviour refused because of the device's current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
    #[error("operation system is not installed")]
    OperatingSystemNotInstalled,
}

/// A lookup returned nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} with id `{id}` was not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// An edit carried a row version that no longer matches the stored one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "device `{id}` was modified by another actor (expected version {expected}, found {})",
    display_actual(.actual.as_ref())
)]
pub struct ConcurrencyConflictError {
    pub id: String,
    pub expected: RowVersion,
    /// The version currently stored, or `None` when the row is gone.
    pub actual: Option<RowVersion>,
}

fn display_actual(actual: Option<&RowVersion>) -> String {
    actual.map_or_else(|| "none".to_string(), ToString::to_string)
}

/// Stored data that cannot be mapped back to the domain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataIntegrityError {
    #[error("device `{id}` has no row in any variant table")]
    UnknownVariant { id: String },

    #[error("device `{id}` has a malformed {column} value: {reason}")]
    MalformedColumn {
        id: String,
        column: &'static str,
        reason: String,
    },
}
