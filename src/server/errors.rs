//! # Server Errors
//!
//! Error types for the network daemon.

use std::io;

use thiserror::Error;

use crate::log::LogError;

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// Shared log failure (out of memory, backing store I/O, closed log)
    #[error("Log error: {0}")]
    Log(#[from] LogError),

    /// Transport read or write failed
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    /// Server is draining and admits no new sessions
    #[error("Server is shutting down")]
    ShuttingDown,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Failed to bind the listener
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// A worker task panicked or was cancelled
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl ServerError {
    /// Short, stable label used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::Log(e) => e.code().code(),
            ServerError::Transport(_) => "TRANSPORT",
            ServerError::ShuttingDown => "SHUTTING_DOWN",
            ServerError::ConfigError(_) => "CONFIG",
            ServerError::Bind { .. } => "BIND",
            ServerError::Worker(_) => "WORKER",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_error_converts() {
        let err: ServerError = LogError::closed().into();
        assert_eq!(err.kind(), "RINGLOG_LOG_CLOSED");
        assert!(err.to_string().contains("Log has been closed"));
    }

    #[test]
    fn test_io_error_converts() {
        let err: ServerError = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert_eq!(err.kind(), "TRANSPORT");
    }

    #[test]
    fn test_bind_error_names_address() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:9000".into(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("0.0.0.0:9000"));
    }
}
