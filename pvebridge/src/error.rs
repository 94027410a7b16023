//! Error types for the codec and the session client.

use thiserror::Error;

/// Errors raised by the attribute-string codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttrError {
    /// A field could not be rendered. No output is produced.
    #[error("Failed to encode field {field}: {reason}")]
    Encode { field: String, reason: String },

    /// A value for a known field could not be parsed.
    #[error("Failed to decode field {field} from '{value}': {reason}")]
    Decode {
        field: String,
        value: String,
        reason: String,
    },
}

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Generic lookup miss (storage, resources).
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("VM not found: {0}")]
    VmNotFound(String),

    #[error("VM template not found: {0}")]
    TemplateNotFound(String),

    /// The platform rejected a VMID because it is already in use.
    #[error("VMID {0} is not available")]
    IdUnavailable(u32),

    /// No free VMID below the platform maximum.
    #[error("No free VMID at or above {0}")]
    IdSpaceExhausted(u32),

    /// An option key outside the allow-list.
    #[error("Unknown VM option: {0}")]
    UnknownOption(String),

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The cluster transport failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A configuration field could not be encoded or decoded.
    #[error(transparent)]
    Attr(#[from] AttrError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
