//! Error types for engine operations.

use thiserror::Error;

/// Errors surfaced by the administrative and lookup operations.
///
/// Malformed inbound packets never produce an error: they are dropped at
/// the point of detection. Protocol failures (DAD verdicts, resolution
/// exhaustion) are reported through their callbacks, not through this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The referenced entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An identical entry already exists and may not be overridden.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A cache or list has reached its capacity.
    #[error("out of resources: {0}")]
    OutOfResources(&'static str),

    /// The interface was disabled by a duplicate link-local address and
    /// will not recover without reconfiguration.
    #[error("interface disabled after link-local DAD failure")]
    InterfaceDisabled,

    /// Caller-supplied argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
