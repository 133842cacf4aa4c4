//! Error types for the IPC provider
//!
//! Transport and JSON-RPC failures are surfaced unmodified to the caller;
//! the only error raised locally by the provider itself is [`Error::Timeout`].

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the IPC provider
#[derive(Error, Debug)]
pub enum Error {
    // === Provider Errors ===
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    // === Connection Errors ===
    #[error("Failed to connect to IPC socket '{path}': {source}")]
    ConnectionFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("IPC connection closed")]
    ConnectionClosed,

    #[error("JSON-RPC protocol error: {0}")]
    Protocol(String),

    // === Input Errors ===
    #[error("Invalid request parameters: {0}")]
    InvalidParams(String),

    // === Configuration Errors ===
    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a connection failed error for a socket path
    pub fn connection_failed(path: &str, source: io::Error) -> Self {
        Self::ConnectionFailed {
            path: path.to_string(),
            source,
        }
    }

    /// Whether this error was raised by the provider's own timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<crate::rpc::JsonRpcError> for Error {
    fn from(e: crate::rpc::JsonRpcError) -> Self {
        Self::JsonRpc {
            code: e.code,
            message: e.message,
            data: e.data,
        }
    }
}
