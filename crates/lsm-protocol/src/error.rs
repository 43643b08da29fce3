//! Protocol error types.

use thiserror::Error;

use crate::types::{ErrorCode, ErrorResponse};

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while framing, exchanging or decoding messages.
///
/// The variants fall into four groups: transport failures (`Io`,
/// `ConnectionClosed`, `Timeout`, `Desynchronized`), protocol corruption
/// (`InvalidHeader`, `FrameTooLarge`, `PeerBug`), argument problems
/// (`InvalidArguments`, `CapabilityOutOfRange`) and application errors
/// returned by the peer (`Remote`), which are passed through untouched.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// IO error while reading or writing a frame.
    #[error("transport communication failure: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection at a frame boundary.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The 10-byte length header was not an unsigned decimal number.
    #[error("malformed frame header: {header:?}")]
    InvalidHeader { header: String },

    /// Payload length does not fit in the fixed-width header.
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Failed to serialize an outgoing message.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The peer sent something that violates the protocol.
    #[error("peer protocol violation: {message}")]
    PeerBug { message: String },

    /// Request parameters could not be decoded.
    #[error("invalid argument(s): {message}")]
    InvalidArguments { message: String },

    /// A capability id points past the end of the capability string.
    #[error("capability {capability} out of range (capability string has {len} flags)")]
    CapabilityOutOfRange { capability: u32, len: usize },

    /// Operation timed out.
    #[error("timeout during {operation}")]
    Timeout { operation: String },

    /// An earlier exchange was interrupted, so the next frame on the stream
    /// may answer a different request.
    #[error("connection unusable after an interrupted exchange")]
    Desynchronized,

    /// Structured error returned by the peer.
    #[error(transparent)]
    Remote(#[from] ErrorResponse),
}

impl ProtocolError {
    /// Creates a peer protocol violation error.
    pub fn peer_bug(message: impl Into<String>) -> Self {
        Self::PeerBug {
            message: message.into(),
        }
    }

    /// Creates an invalid arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Returns true if the connection can no longer be used.
    ///
    /// After any of these the byte stream is either gone or no longer
    /// aligned on a frame boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::ConnectionClosed
                | Self::InvalidHeader { .. }
                | Self::Timeout { .. }
                | Self::Desynchronized
        )
    }

    /// Returns the wire error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io(_)
            | Self::ConnectionClosed
            | Self::InvalidHeader { .. }
            | Self::Desynchronized => ErrorCode::TransportCommunication,
            Self::FrameTooLarge { .. } | Self::Serialization(_) => {
                ErrorCode::TransportSerialization
            }
            Self::PeerBug { .. } => ErrorCode::PluginBug,
            Self::InvalidArguments { .. } => ErrorCode::TransportInvalidArg,
            Self::CapabilityOutOfRange { .. } => ErrorCode::InvalidArgument,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Remote(error) => error.code,
        }
    }

    /// Returns the structured error a peer returned, if any.
    pub fn as_remote(&self) -> Option<&ErrorResponse> {
        match self {
            Self::Remote(error) => Some(error),
            _ => None,
        }
    }

    /// Converts this error into the structured error sent over the wire.
    ///
    /// Remote errors are returned verbatim.
    pub fn to_response(&self) -> ErrorResponse {
        match self {
            Self::Remote(error) => error.clone(),
            other => ErrorResponse::new(other.code(), other.to_string()),
        }
    }
}
