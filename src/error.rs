use thiserror::Error;

use crate::status::{Code, Status};

/// Errors that can occur during RPC operations.
///
/// The variants fall into the three families a caller needs to tell apart:
///
/// - **transport** failures ([`Timeout`](RpcError::Timeout),
///   [`ConnectionClosed`](RpcError::ConnectionClosed),
///   [`Transport`](RpcError::Transport)), raised locally by the broker;
/// - **decode** failures ([`Decode`](RpcError::Decode)), raised when bytes
///   received from the wire cannot be read;
/// - **application** failures ([`Status`](RpcError::Status)), produced by a
///   remote handler and carried back in the reply envelope.
#[derive(Error, Debug)]
pub enum RpcError {
    /// Request timed out waiting for a reply.
    #[error("request timed out")]
    Timeout,

    /// The broker connection was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Broker-level failure other than a timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// Received bytes could not be decoded (envelope or payload).
    #[error("decode error: {0}")]
    Decode(String),

    /// Outbound serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote handler returned a non-OK status.
    #[error("{0}")]
    Status(Status),

    /// Required configuration value missing.
    #[error("missing required configuration: {0}")]
    MissingConfig(String),

    /// Conflicting configuration values.
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),

    /// Subject string rejected before reaching the broker.
    #[error("invalid subject: {0:?}")]
    InvalidSubject(String),
}

impl RpcError {
    /// Build an application error with the given code and message.
    pub fn status(code: Code, message: impl Into<String>) -> Self {
        RpcError::Status(Status::new(code, message))
    }

    /// Shorthand for an [`Code::Unimplemented`] status error.
    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::status(Code::Unimplemented, message)
    }

    /// Shorthand for an [`Code::InvalidArgument`] status error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::status(Code::InvalidArgument, message)
    }

    /// Shorthand for an [`Code::NotFound`] status error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(Code::NotFound, message)
    }

    /// Shorthand for an [`Code::Internal`] status error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::status(Code::Internal, message)
    }

    /// Code carried by this error, if any.
    ///
    /// Application errors report their status code and timeouts report
    /// [`Code::Timeout`]; everything else has no intrinsic code.
    pub fn code(&self) -> Option<Code> {
        // ---
        match self {
            RpcError::Status(status) => Some(status.code),
            RpcError::Timeout => Some(Code::Timeout),
            _ => None,
        }
    }

    /// `true` for failures raised by the broker rather than a remote handler.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RpcError::Timeout | RpcError::ConnectionClosed | RpcError::Transport(_)
        )
    }

    /// `true` for failures to read bytes received from the wire.
    pub fn is_decode(&self) -> bool {
        matches!(self, RpcError::Decode(_))
    }
}

/// Result type alias for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;
