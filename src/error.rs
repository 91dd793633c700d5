//! Error types for the IEC 61850 client.
//!
//! Two layers of errors exist:
//!
//! - [`MmsError`] is what an [`MmsTransport`](crate::transport::MmsTransport)
//!   reports. It is the vocabulary of the MMS stack underneath.
//! - [`IedClientError`] is what callers of this crate see. Every transport
//!   error is mapped exactly once, in `From<MmsError>`.
//!
//! A server refusing a control action (interlock failed, already selected by
//! someone else) is not an error: those operations return `Ok(false)`.

use thiserror::Error;

use crate::types::MmsType;

/// Result type alias for IEC 61850 client operations.
pub type Result<T> = std::result::Result<T, IedClientError>;

/// Broad classification of an [`IedClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Local misuse: bad reference syntax, wrong value kind, bad index.
    Argument,
    /// The session is missing, already open, lost or was refused.
    Connection,
    /// The server declined a well-formed request.
    Service,
}

/// IEC 61850 client error types.
#[derive(Debug, Error)]
pub enum IedClientError {
    // ---- argument errors ----
    /// API called with an invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Object reference is syntactically invalid
    #[error("Invalid object reference: {0}")]
    ObjectReferenceInvalid(String),

    /// Typed value accessed as the wrong kind
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: MmsType, actual: MmsType },

    /// Composite value indexed outside `0..size`
    #[error("Index {index} out of range (size {size})")]
    IndexOutOfRange { index: usize, size: usize },

    /// Server answered with a value of an unexpected type
    #[error("Unexpected value received: {0}")]
    UnexpectedValueReceived(MmsType),

    // ---- connection errors ----
    /// Not connected to a server
    #[error("Not connected")]
    NotConnected,

    /// Connect called on an open connection
    #[error("Already connected")]
    AlreadyConnected,

    /// Connection lost while the request was outstanding
    #[error("Connection lost")]
    ConnectionLost,

    /// Transport connect or association handshake refused
    #[error("Connection rejected: {0}")]
    ConnectionRejected(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ---- service errors ----
    /// Service not supported by client or server
    #[error("Service not supported")]
    ServiceNotSupported,

    /// Request timed out
    #[error("Request timeout")]
    Timeout,

    /// Access denied by the server
    #[error("Access denied")]
    AccessDenied,

    /// Object does not exist on the server
    #[error("Object does not exist")]
    ObjectDoesNotExist,

    /// Object already exists on the server
    #[error("Object already exists")]
    ObjectExists,

    /// Server does not support the requested access method
    #[error("Object access unsupported")]
    ObjectAccessUnsupported,

    /// Malformed response from the server
    #[error("Decode error: {0}")]
    Decode(String),

    /// Anything the server reported that has no dedicated variant
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl IedClientError {
    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an invalid object reference error.
    pub fn object_reference_invalid(msg: impl Into<String>) -> Self {
        Self::ObjectReferenceInvalid(msg.into())
    }

    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument(_)
            | Self::ObjectReferenceInvalid(_)
            | Self::TypeMismatch { .. }
            | Self::IndexOutOfRange { .. }
            | Self::UnexpectedValueReceived(_) => ErrorCategory::Argument,
            Self::NotConnected
            | Self::AlreadyConnected
            | Self::ConnectionLost
            | Self::ConnectionRejected(_)
            | Self::Io(_) => ErrorCategory::Connection,
            Self::ServiceNotSupported
            | Self::Timeout
            | Self::AccessDenied
            | Self::ObjectDoesNotExist
            | Self::ObjectExists
            | Self::ObjectAccessUnsupported
            | Self::Decode(_)
            | Self::Unknown(_) => ErrorCategory::Service,
        }
    }

    /// Check if this error indicates a connection problem.
    pub fn is_connection_error(&self) -> bool {
        self.category() == ErrorCategory::Connection
    }

    /// Check if the server declined the request.
    pub fn is_service_error(&self) -> bool {
        self.category() == ErrorCategory::Service
    }

    /// Check if this error was caused locally by a bad argument.
    pub fn is_argument_error(&self) -> bool {
        self.category() == ErrorCategory::Argument
    }

    /// Stable numeric client error code.
    pub fn code(&self) -> u8 {
        match self {
            Self::NotConnected => 1,
            Self::AlreadyConnected => 2,
            Self::ConnectionLost | Self::Io(_) => 3,
            Self::ServiceNotSupported => 4,
            Self::ConnectionRejected(_) => 5,
            Self::InvalidArgument(_)
            | Self::TypeMismatch { .. }
            | Self::IndexOutOfRange { .. } => 10,
            Self::ObjectReferenceInvalid(_) => 12,
            Self::UnexpectedValueReceived(_) | Self::Decode(_) => 13,
            Self::Timeout => 20,
            Self::AccessDenied => 21,
            Self::ObjectDoesNotExist => 22,
            Self::ObjectExists => 23,
            Self::ObjectAccessUnsupported => 24,
            Self::Unknown(_) => 99,
        }
    }
}

/// Errors reported by the MMS transport collaborator.
#[derive(Debug, Error)]
pub enum MmsError {
    /// Association lost while waiting for the response
    #[error("MMS connection lost")]
    ConnectionLost,

    /// Transport connect or ACSE association refused
    #[error("MMS connection rejected: {0}")]
    ConnectionRejected(String),

    /// No response within the service timeout
    #[error("MMS service timeout")]
    ServiceTimeout,

    /// Confirmed error: object access denied
    #[error("MMS object access denied")]
    AccessDenied,

    /// Confirmed error: object non-existent
    #[error("MMS object non-existent")]
    ObjectNonExistent,

    /// Confirmed error: object access unsupported
    #[error("MMS object access unsupported")]
    ObjectAccessUnsupported,

    /// Confirmed error: definition object exists
    #[error("MMS object exists")]
    ObjectExists,

    /// Service not supported by the peer
    #[error("MMS service not supported")]
    ServiceNotSupported,

    /// Malformed PDU
    #[error("MMS decode error: {0}")]
    Decode(String),

    /// Socket level failure
    #[error("MMS I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other service error
    #[error("MMS error: {0}")]
    Other(String),
}

impl From<MmsError> for IedClientError {
    fn from(err: MmsError) -> Self {
        match err {
            MmsError::ConnectionLost => Self::ConnectionLost,
            MmsError::ConnectionRejected(reason) => Self::ConnectionRejected(reason),
            MmsError::ServiceTimeout => Self::Timeout,
            MmsError::AccessDenied => Self::AccessDenied,
            MmsError::ObjectNonExistent => Self::ObjectDoesNotExist,
            MmsError::ObjectAccessUnsupported => Self::ObjectAccessUnsupported,
            MmsError::ObjectExists => Self::ObjectExists,
            MmsError::ServiceNotSupported => Self::ServiceNotSupported,
            MmsError::Decode(msg) => Self::Decode(msg),
            MmsError::Io(e) => Self::Io(e),
            MmsError::Other(msg) => Self::Unknown(msg),
        }
    }
}
