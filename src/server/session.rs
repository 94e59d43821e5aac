//! One accepted connection
//!
//! State machine:
//!
//! ```text
//! Accepted -> Receiving -> (Committing <-> Receiving) -> Closed
//! ```
//!
//! - Receiving: transport bytes are fed to the session's accumulator
//! - Committing: each completed record goes through
//!   `SharedLog::commit`, and the returned snapshot is written back
//! - Closed: peer EOF, any error, or the stop signal
//!
//! Unterminated bytes are discarded on close, never committed. A commit
//! already in progress finishes before the stop signal is observed. Its
//! reply then has `drain_write_timeout_ms` to reach the peer; a peer that
//! stops reading cannot hold the session open past that.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use crate::log::{LineAccumulator, Record};
use crate::observability::{log_event_with_fields, Event, Logger, Severity};

use super::errors::{ServerError, ServerResult};
use super::registry::{SessionGuard, SessionId};
use super::state::ServerState;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    Receiving,
    Committing,
    Closed,
}

/// Why a session closed without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Zero-length read
    PeerClosed,
    /// Stop signal observed
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::PeerClosed => "peer_closed",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Server-side state for one connection.
pub struct Session<S> {
    guard: SessionGuard,
    peer: Option<SocketAddr>,
    stream: S,
    accumulator: LineAccumulator,
    state: SessionState,
    server: Arc<ServerState>,
    stop: watch::Receiver<bool>,
    records_committed: u64,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a session for an already registered connection.
    pub fn new(
        guard: SessionGuard,
        stream: S,
        peer: Option<SocketAddr>,
        server: Arc<ServerState>,
    ) -> Self {
        let accumulator = server.new_accumulator();
        let stop = server.registry.stop_signal();
        Self {
            guard,
            peer,
            stream,
            accumulator,
            state: SessionState::Accepted,
            server,
            stop,
            records_committed: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.guard.id()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drives the session to `Closed`.
    ///
    /// Releases the transport and the accumulator and deregisters the
    /// session exactly once, whatever the outcome.
    pub async fn run(mut self) -> ServerResult<CloseReason> {
        let result = self.drive().await;

        self.state = SessionState::Closed;
        let discarded = self.accumulator.len();
        self.accumulator.clear();
        let grace = self.server.config.drain_write_timeout();
        let _ = tokio::time::timeout(grace, self.stream.shutdown()).await;

        let id = self.id().to_string();
        let peer = self.peer_label();
        let committed = self.records_committed.to_string();
        let discarded = discarded.to_string();

        match &result {
            Ok(reason) => {
                self.server.metrics.increment_sessions_closed();
                log_event_with_fields(
                    Event::SessionClosed,
                    &[
                        ("session_id", &id),
                        ("peer", &peer),
                        ("reason", reason.as_str()),
                        ("records_committed", &committed),
                        ("discarded_bytes", &discarded),
                    ],
                );
            }
            Err(e) => {
                self.server.metrics.increment_sessions_failed();
                let message = e.to_string();
                log_event_with_fields(
                    Event::SessionFailed,
                    &[
                        ("session_id", &id),
                        ("peer", &peer),
                        ("error", e.kind()),
                        ("message", &message),
                        ("records_committed", &committed),
                        ("discarded_bytes", &discarded),
                    ],
                );
            }
        }

        // Dropping `self` drops the guard, which deregisters.
        result
    }

    async fn drive(&mut self) -> ServerResult<CloseReason> {
        let mut chunk = vec![0u8; self.server.config.read_chunk_bytes];

        loop {
            self.state = SessionState::Receiving;

            let read = tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop) => return Ok(CloseReason::Shutdown),
                read = self.stream.read(&mut chunk) => read?,
            };

            if read == 0 {
                return Ok(CloseReason::PeerClosed);
            }

            let terminators = self.accumulator.append(&chunk[..read])?;

            // Indices shift down as each record is cut from the front.
            let mut consumed = 0;
            for index in terminators {
                // Records not yet handed to the log are dropped once stop is requested.
                if *self.stop.borrow() {
                    return Ok(CloseReason::Shutdown);
                }
                self.state = SessionState::Committing;
                let record = self.accumulator.take_complete_record_up_to(index - consumed)?;
                consumed = index + 1;
                if !self.commit(record).await? {
                    return Ok(CloseReason::Shutdown);
                }
            }
        }
    }

    /// Commits `record` and sends the snapshot back. Returns false if
    /// shutdown cut the reply short.
    async fn commit(&mut self, record: Record) -> ServerResult<bool> {
        let log = Arc::clone(&self.server.log);
        let receipt = tokio::task::spawn_blocking(move || log.commit(record))
            .await
            .map_err(|e| ServerError::Worker(e.to_string()))??;

        self.records_committed += 1;
        let metrics = Arc::clone(&self.server.metrics);
        metrics.record_commit(receipt.record_len as u64);

        if Logger::enabled(Severity::Trace) {
            let id = self.id().to_string();
            let sequence = receipt.snapshot.sequence.to_string();
            let len = receipt.record_len.to_string();
            log_event_with_fields(
                Event::RecordCommitted,
                &[("session_id", &id), ("sequence", &sequence), ("bytes", &len)],
            );
            if let Some(evicted) = receipt.evicted_len {
                let evicted = evicted.to_string();
                log_event_with_fields(
                    Event::RecordEvicted,
                    &[("session_id", &id), ("sequence", &sequence), ("bytes", &evicted)],
                );
            }
        }
        if receipt.evicted_len.is_some() {
            metrics.increment_records_evicted();
        }

        let delivered = self.send_snapshot(receipt.snapshot.as_bytes()).await?;
        if delivered {
            metrics.add_snapshot_bytes_sent(receipt.snapshot.len() as u64);
        }
        Ok(delivered)
    }

    /// Writes `bytes` to the peer. Once stop is requested the write gets the
    /// drain grace period, then is abandoned.
    async fn send_snapshot(&mut self, bytes: &[u8]) -> ServerResult<bool> {
        let grace = self.server.config.drain_write_timeout();
        let stream = &mut self.stream;
        let write = async move {
            stream.write_all(bytes).await?;
            stream.flush().await
        };
        tokio::pin!(write);

        tokio::select! {
            biased;
            written = &mut write => {
                written?;
                return Ok(true);
            }
            _ = stop_requested(&mut self.stop) => {}
        }

        match tokio::time::timeout(grace, &mut write).await {
            Ok(written) => {
                written?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    fn peer_label(&self) -> String {
        self.peer
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}

/// Resolves once shutdown has been requested, including before the call.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}
