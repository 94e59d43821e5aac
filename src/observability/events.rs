//! Observable events
//!
//! Events are explicit and typed. Every log line the daemon emits names one
//! of these.

use std::fmt;

use super::logger::Severity;

/// Observable events in ringlog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Configuration loaded and validated
    ConfigLoaded,
    /// Backing store opened
    BackendOpened,
    /// Server is starting
    ServerStarting,
    /// Listener bound, accepting connections
    ServerListening,
    /// Stop requested, no new sessions admitted
    ShutdownRequested,
    /// Every session closed
    ShutdownDrained,
    /// Backing store released
    BackendClosed,

    // Sessions
    /// Connection accepted and registered
    SessionAccepted,
    /// Connection refused because the server is stopping
    SessionRejected,
    /// Session closed normally (peer EOF or shutdown)
    SessionClosed,
    /// Session ended by an error
    SessionFailed,
    /// accept() failed, loop continues
    AcceptFailed,

    // Log
    /// Record committed
    RecordCommitted,
    /// Oldest record evicted from the ring
    RecordEvicted,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::BackendOpened => "BACKEND_OPENED",
            Event::ServerStarting => "SERVER_STARTING",
            Event::ServerListening => "SERVER_LISTENING",
            Event::ShutdownRequested => "SHUTDOWN_REQUESTED",
            Event::ShutdownDrained => "SHUTDOWN_DRAINED",
            Event::BackendClosed => "BACKEND_CLOSED",

            Event::SessionAccepted => "SESSION_ACCEPTED",
            Event::SessionRejected => "SESSION_REJECTED",
            Event::SessionClosed => "SESSION_CLOSED",
            Event::SessionFailed => "SESSION_FAILED",
            Event::AcceptFailed => "ACCEPT_FAILED",

            Event::RecordCommitted => "RECORD_COMMITTED",
            Event::RecordEvicted => "RECORD_EVICTED",
        }
    }

    /// Default severity for this event
    pub fn severity(&self) -> Severity {
        match self {
            Event::RecordCommitted | Event::RecordEvicted => Severity::Trace,
            Event::SessionRejected => Severity::Warn,
            Event::SessionFailed | Event::AcceptFailed => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_unique() {
        let events = [
            Event::ConfigLoaded,
            Event::BackendOpened,
            Event::ServerStarting,
            Event::ServerListening,
            Event::ShutdownRequested,
            Event::ShutdownDrained,
            Event::BackendClosed,
            Event::SessionAccepted,
            Event::SessionRejected,
            Event::SessionClosed,
            Event::SessionFailed,
            Event::AcceptFailed,
            Event::RecordCommitted,
            Event::RecordEvicted,
        ];
        let mut names: Vec<_> = events.iter().map(|e| e.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), events.len());
    }

    #[test]
    fn test_per_record_events_are_trace() {
        assert_eq!(Event::RecordCommitted.severity(), Severity::Trace);
        assert_eq!(Event::SessionFailed.severity(), Severity::Error);
        assert_eq!(Event::SessionAccepted.severity(), Severity::Info);
    }
}
