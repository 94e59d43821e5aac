//! Log error types
//!
//! Error codes:
//! - RINGLOG_OUT_OF_MEMORY (ERROR severity)
//! - RINGLOG_IO_ERROR (ERROR severity)
//! - RINGLOG_LOG_CLOSED (ERROR severity)
//! - RINGLOG_CAPACITY_INVARIANT (FATAL severity)
//! - RINGLOG_LOCK_POISONED (FATAL severity)
//!
//! ERROR severity ends the calling session only. FATAL marks a broken
//! precondition and is never expected at runtime.

use std::collections::TryReserveError;
use std::fmt;
use std::io;

/// Severity levels for log errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// The operation fails, the log and other sessions continue
    Error,
    /// Programmer error or unrecoverable state
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Log-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogErrorCode {
    /// Buffer growth or record allocation failed
    RingLogOutOfMemory,
    /// Backing store read or write failed
    RingLogIoError,
    /// Commit attempted after the log was torn down
    RingLogLogClosed,
    /// Ring created with zero capacity
    RingLogCapacityInvariant,
    /// A thread panicked while holding the log lock
    RingLogLockPoisoned,
}

impl LogErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            LogErrorCode::RingLogOutOfMemory => "RINGLOG_OUT_OF_MEMORY",
            LogErrorCode::RingLogIoError => "RINGLOG_IO_ERROR",
            LogErrorCode::RingLogLogClosed => "RINGLOG_LOG_CLOSED",
            LogErrorCode::RingLogCapacityInvariant => "RINGLOG_CAPACITY_INVARIANT",
            LogErrorCode::RingLogLockPoisoned => "RINGLOG_LOCK_POISONED",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            LogErrorCode::RingLogOutOfMemory => ErrorSeverity::Error,
            LogErrorCode::RingLogIoError => ErrorSeverity::Error,
            LogErrorCode::RingLogLogClosed => ErrorSeverity::Error,
            LogErrorCode::RingLogCapacityInvariant => ErrorSeverity::Fatal,
            LogErrorCode::RingLogLockPoisoned => ErrorSeverity::Fatal,
        }
    }
}

impl fmt::Display for LogErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Log error with code, message and optional context
#[derive(Debug)]
pub struct LogError {
    code: LogErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl LogError {
    fn new(code: LogErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Allocation failure while growing a buffer or building a record
    pub fn out_of_memory(message: impl Into<String>) -> Self {
        Self::new(LogErrorCode::RingLogOutOfMemory, message)
    }

    /// Allocation failure with the number of bytes that were requested
    pub fn out_of_memory_requesting(requested: usize, reason: TryReserveError) -> Self {
        Self {
            details: Some(format!("requested_bytes: {}", requested)),
            ..Self::out_of_memory(format!("Allocation failed: {}", reason))
        }
    }

    /// Backing store I/O failure
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(LogErrorCode::RingLogIoError, message)
        }
    }

    /// Commit or read against a log that has been closed
    pub fn closed() -> Self {
        Self::new(LogErrorCode::RingLogLogClosed, "Log has been closed")
    }

    /// Ring capacity must be at least one slot
    pub fn capacity_invariant(capacity: usize) -> Self {
        Self {
            details: Some(format!("capacity: {}", capacity)),
            ..Self::new(
                LogErrorCode::RingLogCapacityInvariant,
                "Ring capacity must be at least 1",
            )
        }
    }

    /// Log lock poisoned by a panicking holder
    pub fn lock_poisoned() -> Self {
        Self::new(LogErrorCode::RingLogLockPoisoned, "Log lock poisoned")
    }

    /// Returns the error code
    pub fn code(&self) -> LogErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> ErrorSeverity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error is fatal
    pub fn is_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for LogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for log operations
pub type LogResult<T> = Result<T, LogError>;
