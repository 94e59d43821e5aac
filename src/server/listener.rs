//! TCP front end
//!
//! One tokio task accepts connections; each admitted connection gets its own
//! session task. Shutdown runs in a fixed order:
//!
//! 1. Stop accepting and signal live sessions
//! 2. Wait for every session to deregister
//! 3. Close the shared log
//!
//! The log is never released while a session could still commit to it.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::observability::{log_event, log_event_with_fields, Event};

use super::errors::{ServerError, ServerResult};
use super::session::Session;
use super::state::ServerState;

/// Bound listener plus the shared server state
pub struct LogServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl LogServer {
    /// Binds `state.config.listen_addr`.
    pub async fn bind(state: Arc<ServerState>) -> ServerResult<Self> {
        let addr = state.config.listen_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let local = listener.local_addr()?.to_string();
        log_event_with_fields(Event::ServerListening, &[("local_addr", &local)]);

        Ok(Self { listener, state })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Serves until `shutdown` completes, then drains and closes the log.
    pub async fn run_until<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        let state = Arc::clone(&self.state);
        let accept_task = self.spawn_accept_loop();

        shutdown.await;
        log_event_with_fields(
            Event::ShutdownRequested,
            &[("live_sessions", &state.registry.len().to_string())],
        );

        state.registry.request_shutdown().await;
        log_event(Event::ShutdownDrained);

        accept_task
            .await
            .map_err(|e| ServerError::Worker(e.to_string()))?;

        state.log.close()?;
        let metrics = state.metrics.to_json();
        log_event_with_fields(
            Event::BackendClosed,
            &[("backend", state.log.kind()), ("metrics", &metrics)],
        );

        Ok(())
    }

    fn spawn_accept_loop(self) -> JoinHandle<()> {
        let stop = self.state.registry.stop_signal();
        tokio::spawn(accept_loop(self.listener, self.state, stop))
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<ServerState>, mut stop: watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            break;
        }

        tokio::select! {
            biased;
            _ = stop.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => admit(&state, stream, peer),
                Err(e) => {
                    state.metrics.increment_accept_failures();
                    let message = e.to_string();
                    log_event_with_fields(Event::AcceptFailed, &[("error", &message)]);
                }
            },
        }
    }
    // Dropping the listener here stops the OS from queueing new connections.
}

fn admit(state: &Arc<ServerState>, stream: TcpStream, peer: SocketAddr) {
    let peer_label = peer.to_string();

    let guard = match state.registry.register(Some(peer)) {
        Ok(guard) => guard,
        Err(e) => {
            state.metrics.increment_sessions_rejected();
            log_event_with_fields(
                Event::SessionRejected,
                &[("peer", &peer_label), ("reason", e.kind())],
            );
            return;
        }
    };

    state.metrics.increment_sessions_accepted();
    let id = guard.id().to_string();
    log_event_with_fields(Event::SessionAccepted, &[("session_id", &id), ("peer", &peer_label)]);

    let session = Session::new(guard, stream, Some(peer), Arc::clone(state));
    tokio::spawn(async move {
        // Outcome is logged by the session itself.
        let _ = session.run().await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::config::ServerConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_bind_port_zero_resolves() {
        let config = ServerConfig::ring("127.0.0.1:0", 4);
        let state = ServerState::from_config(config).unwrap();
        let server = LogServer::bind(state).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_failure_reports_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let config = ServerConfig::ring(addr.clone(), 4);
        let state = ServerState::from_config(config).unwrap();
        let err = LogServer::bind(state).await.err().unwrap();
        assert!(err.to_string().contains(&addr));
        assert_eq!(err.kind(), "BIND");
    }

    #[tokio::test]
    async fn test_serve_and_shutdown_closes_log() {
        let config = ServerConfig::ring("127.0.0.1:0", 4);
        let state = ServerState::from_config(config).unwrap();
        let server = LogServer::bind(Arc::clone(&state)).await.unwrap();
        let addr = server.local_addr().unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"hello\n").await.unwrap();
        let mut buf = [0u8; 6];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello\n");

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        assert!(state.log.is_closed());
        assert!(state.registry.is_empty());
        assert_eq!(state.metrics.snapshot().sessions_accepted, 1);
    }
}
