//! Client error types.

use std::time::Duration;

use lsm_protocol::{ErrorCode, ErrorResponse, JobId, ProtocolError};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Framing, transport or remote error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The plugin URI could not be parsed.
    #[error("invalid uri {uri:?}: {message}")]
    InvalidUri { uri: String, message: String },

    /// An argument was rejected before anything was sent.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Connecting to the plugin socket failed.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// The job finished but releasing it failed.
    #[error("successfully waited for job {job_id}, but got an error freeing it: {source}")]
    JobCleanup {
        job_id: JobId,
        source: ProtocolError,
    },

    /// The job did not finish before the configured deadline.
    #[error("job {job_id} still running after {waited:?}")]
    JobTimeout { job_id: JobId, waited: Duration },
}

impl ClientError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Returns the error code this error corresponds to.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Protocol(error) => error.code(),
            Self::InvalidUri { .. } | Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::Connection { .. } => ErrorCode::TransportCommunication,
            Self::JobCleanup { .. } => ErrorCode::PluginBug,
            Self::JobTimeout { .. } => ErrorCode::Timeout,
        }
    }

    /// Returns the structured error returned by the plugin, if any.
    pub fn remote(&self) -> Option<&ErrorResponse> {
        match self {
            Self::Protocol(error) => error.as_remote(),
            _ => None,
        }
    }
}
