//! Plugin error types.

use lsm_protocol::ProtocolError;
use thiserror::Error;

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors that end a plugin connection or reject its setup.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Communication with the client failed.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A handler was bound to a method outside the known set.
    #[error("Unknown method: {method}")]
    UnknownMethod { method: String },

    /// The dispatch table or plugin configuration is inconsistent.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PluginError {
    /// Creates an unknown method error.
    pub fn unknown_method(method: impl Into<String>) -> Self {
        Self::UnknownMethod {
            method: method.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
