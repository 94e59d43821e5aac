//! Shutdown Drain Tests
//!
//! - Sessions blocked in a transport read are released by shutdown
//! - Shutdown completes only after every session has deregistered
//! - Partially accumulated records are discarded, never committed
//! - The log is closed last; commits afterwards fail
//! - A peer that never reads its replies cannot block the drain
//! - A commit in flight at shutdown completes and its reply is delivered

use ringlog::log::{AppendOutcome, LogBackend, LogResult, Record, RingStore, SharedLog};
use ringlog::server::{LogServer, ServerConfig, ServerState};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

const IDLE_SESSIONS: usize = 6;

async fn wait_for_sessions(state: &ServerState, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.registry.len() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("sessions never registered");
}

#[tokio::test]
async fn test_idle_sessions_drain_on_shutdown() {
    let state = ServerState::from_config(ServerConfig::ring("127.0.0.1:0", 10)).unwrap();
    let server = LogServer::bind(Arc::clone(&state)).await.unwrap();
    let addr = server.local_addr().unwrap();

    let (stop, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run_until(async {
        let _ = rx.await;
    }));

    let mut committed = TcpStream::connect(addr).await.unwrap();
    committed.write_all(b"before shutdown\n").await.unwrap();
    let mut reply = vec![0u8; 16];
    committed.read_exact(&mut reply).await.unwrap();

    let mut idle = Vec::new();
    for i in 0..IDLE_SESSIONS {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(format!("half a record {}", i).as_bytes())
            .await
            .unwrap();
        idle.push(stream);
    }
    wait_for_sessions(&state, IDLE_SESSIONS + 1).await;

    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("shutdown did not drain")
        .unwrap()
        .unwrap();

    assert!(state.registry.is_empty());
    assert!(state.registry.is_stopping());
    assert!(state.log.is_closed());
    assert_eq!(state.log.commit_count().unwrap(), 1);

    for mut stream in idle {
        let mut rest = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
            .await
            .expect("session socket was not closed");
        // A reset is as good as EOF here; nothing must have been echoed.
        if read.is_ok() {
            assert!(rest.is_empty());
        }
    }

    let err = state.log.commit_and_snapshot(Record::from("late\n")).unwrap_err();
    assert_eq!(err.code().code(), "RINGLOG_LOG_CLOSED");

    let metrics = state.metrics.snapshot();
    assert_eq!(metrics.sessions_accepted, (IDLE_SESSIONS + 1) as u64);
    assert_eq!(metrics.sessions_closed, (IDLE_SESSIONS + 1) as u64);
}

#[tokio::test]
async fn test_shutdown_without_sessions_is_prompt() {
    let state = ServerState::from_config(ServerConfig::ring("127.0.0.1:0", 2)).unwrap();
    let server = LogServer::bind(Arc::clone(&state)).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), server.run_until(async {}))
        .await
        .expect("shutdown hung")
        .unwrap();

    assert!(state.log.is_closed());
    assert!(state.registry.register(None).is_err());
}

#[tokio::test]
async fn test_no_connections_accepted_after_shutdown() {
    let state = ServerState::from_config(ServerConfig::ring("127.0.0.1:0", 2)).unwrap();
    let server = LogServer::bind(Arc::clone(&state)).await.unwrap();
    let addr = server.local_addr().unwrap();

    server.run_until(async {}).await.unwrap();

    // The listener is gone, so connecting fails or the socket is closed at once.
    if let Ok(mut stream) = TcpStream::connect(addr).await {
        let _ = stream.write_all(b"hello\n").await;
        let mut buf = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
            .await
            .expect("socket left open");
        if read.is_ok() {
            assert!(buf.is_empty());
        }
    }
    assert_eq!(state.metrics.snapshot().sessions_accepted, 0);
}

// =============================================================================
// Stalled Peers
// =============================================================================

#[tokio::test]
async fn test_peer_that_never_reads_does_not_block_shutdown() {
    let state = ServerState::from_config(ServerConfig::ring("127.0.0.1:0", 10)).unwrap();
    let server = LogServer::bind(Arc::clone(&state)).await.unwrap();
    let addr = server.local_addr().unwrap();

    let (stop, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run_until(async {
        let _ = rx.await;
    }));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let writer = tokio::spawn(async move {
        let record = format!("{}\n", "m".repeat(1024 * 1024));
        for _ in 0..10 {
            if stream.write_all(record.as_bytes()).await.is_err() {
                break;
            }
        }
        // Hold the socket open without ever reading.
        std::future::pending::<()>().await;
    });

    tokio::time::timeout(Duration::from_secs(10), async {
        while state.log.commit_count().unwrap() < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("records never committed");

    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("stalled peer blocked shutdown")
        .unwrap()
        .unwrap();

    assert!(state.registry.is_empty());
    assert!(state.log.is_closed());
    writer.abort();
}

// =============================================================================
// Commits In Flight
// =============================================================================

/// Ring backend that records every call and makes appends slow.
struct SlowRecordingBackend {
    ring: RingStore,
    calls: Arc<Mutex<Vec<&'static str>>>,
    delay: Duration,
}

impl LogBackend for SlowRecordingBackend {
    fn append(&mut self, record: Record) -> LogResult<AppendOutcome> {
        self.calls.lock().unwrap().push("append");
        std::thread::sleep(self.delay);
        LogBackend::append(&mut self.ring, record)
    }

    fn snapshot(&mut self) -> LogResult<Vec<u8>> {
        LogBackend::snapshot(&mut self.ring)
    }

    fn retained_bytes(&self) -> u64 {
        LogBackend::retained_bytes(&self.ring)
    }

    fn record_count(&self) -> Option<usize> {
        LogBackend::record_count(&self.ring)
    }

    fn close(&mut self) -> LogResult<()> {
        self.calls.lock().unwrap().push("close");
        LogBackend::close(&mut self.ring)
    }

    fn kind(&self) -> &'static str {
        "slow_ring"
    }
}

#[tokio::test]
async fn test_shutdown_during_commits_closes_after_last_commit() {
    const CLIENTS: usize = 4;
    const RECORDS: usize = 5;

    let calls = Arc::new(Mutex::new(Vec::new()));
    let backend = SlowRecordingBackend {
        ring: RingStore::new(CLIENTS * RECORDS).unwrap(),
        calls: Arc::clone(&calls),
        delay: Duration::from_millis(30),
    };
    let config = ServerConfig::ring("127.0.0.1:0", CLIENTS * RECORDS);
    let state = ServerState::new(config, SharedLog::new(Box::new(backend)));
    let server = LogServer::bind(Arc::clone(&state)).await.unwrap();
    let addr = server.local_addr().unwrap();

    let (stop, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run_until(async {
        let _ = rx.await;
    }));

    let clients: Vec<_> = (0..CLIENTS)
        .map(|c| {
            tokio::spawn(async move {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                let batch: String = (0..RECORDS).map(|r| format!("c{}-r{}\n", c, r)).collect();
                stream.write_all(batch.as_bytes()).await.unwrap();

                let mut received = Vec::new();
                let _ = stream.read_to_end(&mut received).await;
                received.len() as u64
            })
        })
        .collect();

    tokio::time::timeout(Duration::from_secs(10), async {
        while state.log.commit_count().unwrap() < 3 || state.registry.len() < CLIENTS {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("commits never started");

    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("shutdown did not drain")
        .unwrap()
        .unwrap();

    let mut bytes_received = 0;
    for client in clients {
        bytes_received += client.await.unwrap();
    }

    // close() is the last call and no append follows it.
    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls.last(), Some(&"close"));
    assert_eq!(calls.iter().filter(|c| **c == "close").count(), 1);

    let commits = state.log.commit_count().unwrap();
    let appends = calls.iter().filter(|c| **c == "append").count() as u64;
    assert_eq!(appends, commits);

    // Every committed record's reply reached its client in full.
    let metrics = state.metrics.snapshot();
    assert_eq!(metrics.records_committed, commits);
    assert_eq!(metrics.snapshot_bytes_sent, bytes_received);
    assert_eq!(metrics.sessions_failed, 0);
    assert_eq!(metrics.sessions_closed, CLIENTS as u64);

    let err = state.log.commit_and_snapshot(Record::from("late\n")).unwrap_err();
    assert_eq!(err.code().code(), "RINGLOG_LOG_CLOSED");
}
