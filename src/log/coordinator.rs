//! Shared log coordinator
//!
//! Owns the backing store and serializes every append together with the
//! snapshot that follows it. One critical section per call:
//!
//! 1. Acquire the log lock
//! 2. Append the record
//! 3. Read the full log back
//! 4. Release
//!
//! The order in which callers acquire the lock is the commit order, and each
//! snapshot contains exactly the records committed up to and including the
//! caller's own. A failed append leaves the store valid for everyone else.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use super::backend::{FileBackend, FileBackendOptions, LogBackend};
use super::errors::{LogError, LogResult};
use super::record::Record;
use super::ring::RingStore;

/// Full log contents as observed at one point in the commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Number of commits applied when the snapshot was taken
    pub sequence: u64,
    /// Retained records concatenated oldest first
    pub data: Vec<u8>,
}

impl Snapshot {
    /// Snapshot bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Snapshot size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the log was empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// What a commit did to the store, for logging and counters.
#[derive(Debug)]
pub struct CommitReceipt {
    /// Snapshot taken right after the commit
    pub snapshot: Snapshot,
    /// Size of the committed record
    pub record_len: usize,
    /// Size of the record evicted to make room, if any
    pub evicted_len: Option<usize>,
}

struct LogState {
    backend: Box<dyn LogBackend>,
    commits: u64,
    closed: bool,
}

/// Concurrency-safe append-then-read-back log.
pub struct SharedLog {
    kind: &'static str,
    state: Mutex<LogState>,
}

impl SharedLog {
    /// Wraps an arbitrary backend.
    pub fn new(backend: Box<dyn LogBackend>) -> Self {
        Self {
            kind: backend.kind(),
            state: Mutex::new(LogState {
                backend,
                commits: 0,
                closed: false,
            }),
        }
    }

    /// Bounded log over a ring of `capacity` slots.
    pub fn ring(capacity: usize) -> LogResult<Self> {
        Ok(Self::new(Box::new(RingStore::new(capacity)?)))
    }

    /// Unbounded log over the file at `path`.
    pub fn file(path: impl Into<PathBuf>, options: FileBackendOptions) -> LogResult<Self> {
        Ok(Self::new(Box::new(FileBackend::open(path, options)?)))
    }

    /// Backend name.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    fn lock(&self) -> LogResult<MutexGuard<'_, LogState>> {
        self.state.lock().map_err(|_| LogError::lock_poisoned())
    }

    /// Appends `record` and returns the full log as of immediately after it.
    ///
    /// # Errors
    ///
    /// - `RINGLOG_LOG_CLOSED` after `close()`
    /// - `RINGLOG_IO_ERROR` if the file backend fails
    /// - `RINGLOG_OUT_OF_MEMORY` if the snapshot cannot be allocated
    pub fn commit_and_snapshot(&self, record: Record) -> LogResult<Snapshot> {
        self.commit(record).map(|receipt| receipt.snapshot)
    }

    /// Same as `commit_and_snapshot`, also reporting record and eviction sizes.
    pub fn commit(&self, record: Record) -> LogResult<CommitReceipt> {
        let mut state = self.lock()?;
        if state.closed {
            return Err(LogError::closed());
        }

        let record_len = record.len();
        let outcome = state.backend.append(record)?;
        state.commits += 1;

        let evicted_len = outcome.evicted.map(|evicted| evicted.len());
        let data = state.backend.snapshot()?;

        Ok(CommitReceipt {
            snapshot: Snapshot {
                sequence: state.commits,
                data,
            },
            record_len,
            evicted_len,
        })
    }

    /// Reads the full log without committing.
    pub fn snapshot(&self) -> LogResult<Snapshot> {
        let mut state = self.lock()?;
        if state.closed {
            return Err(LogError::closed());
        }
        let data = state.backend.snapshot()?;
        Ok(Snapshot {
            sequence: state.commits,
            data,
        })
    }

    /// Commits applied so far.
    pub fn commit_count(&self) -> LogResult<u64> {
        Ok(self.lock()?.commits)
    }

    /// Bytes a snapshot would return.
    pub fn retained_bytes(&self) -> LogResult<u64> {
        Ok(self.lock()?.backend.retained_bytes())
    }

    /// Records retained, for backends that track them.
    pub fn record_count(&self) -> LogResult<Option<usize>> {
        Ok(self.lock()?.backend.record_count())
    }

    /// Whether `close()` has run.
    pub fn is_closed(&self) -> bool {
        self.lock().map(|state| state.closed).unwrap_or(true)
    }

    /// Tears down the backend. Later commits fail with `RINGLOG_LOG_CLOSED`.
    ///
    /// Idempotent.
    pub fn close(&self) -> LogResult<()> {
        let mut state = self.lock()?;
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.backend.close()
    }
}

impl std::fmt::Debug for SharedLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never takes the state lock; formatting may happen while it is held.
        f.debug_struct("SharedLog")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::backend::AppendOutcome;
    use std::io;

    #[test]
    fn test_commit_returns_snapshot_with_own_record() {
        let log = SharedLog::ring(3).unwrap();

        let first = log.commit_and_snapshot(Record::from("a\n")).unwrap();
        assert_eq!(first.as_bytes(), b"a\n");
        assert_eq!(first.sequence, 1);

        let second = log.commit_and_snapshot(Record::from("b\n")).unwrap();
        assert_eq!(second.as_bytes(), b"a\nb\n");
        assert_eq!(second.sequence, 2);
    }

    #[test]
    fn test_commit_reports_eviction() {
        let log = SharedLog::ring(1).unwrap();
        let receipt = log.commit(Record::from("abc\n")).unwrap();
        assert_eq!(receipt.evicted_len, None);

        let receipt = log.commit(Record::from("de\n")).unwrap();
        assert_eq!(receipt.evicted_len, Some(4));
        assert_eq!(receipt.record_len, 3);
        assert_eq!(receipt.snapshot.as_bytes(), b"de\n");
    }

    #[test]
    fn test_commit_after_close_rejected() {
        let log = SharedLog::ring(2).unwrap();
        log.commit_and_snapshot(Record::from("x\n")).unwrap();
        log.close().unwrap();
        log.close().unwrap();

        assert!(log.is_closed());
        let err = log.commit_and_snapshot(Record::from("y\n")).unwrap_err();
        assert_eq!(err.code().code(), "RINGLOG_LOG_CLOSED");
        assert!(log.snapshot().is_err());
    }

    struct FailingBackend {
        stored: Vec<u8>,
        fail_next: bool,
    }

    impl LogBackend for FailingBackend {
        fn append(&mut self, record: Record) -> LogResult<AppendOutcome> {
            if self.fail_next {
                self.fail_next = false;
                return Err(LogError::io(
                    "injected",
                    io::Error::new(io::ErrorKind::Other, "disk full"),
                ));
            }
            self.stored.extend_from_slice(record.as_bytes());
            Ok(AppendOutcome::default())
        }

        fn snapshot(&mut self) -> LogResult<Vec<u8>> {
            Ok(self.stored.clone())
        }

        fn retained_bytes(&self) -> u64 {
            self.stored.len() as u64
        }

        fn record_count(&self) -> Option<usize> {
            None
        }

        fn close(&mut self) -> LogResult<()> {
            Ok(())
        }

        fn kind(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn test_failed_append_leaves_log_usable() {
        let log = SharedLog::new(Box::new(FailingBackend {
            stored: b"a\n".to_vec(),
            fail_next: true,
        }));

        let err = log.commit_and_snapshot(Record::from("bad\n")).unwrap_err();
        assert_eq!(err.code().code(), "RINGLOG_IO_ERROR");
        assert_eq!(log.commit_count().unwrap(), 0);

        let snapshot = log.commit_and_snapshot(Record::from("b\n")).unwrap();
        assert_eq!(snapshot.as_bytes(), b"a\nb\n");
        assert_eq!(snapshot.sequence, 1);
        assert_eq!(log.kind(), "failing");
    }

    #[test]
    fn test_debug_while_lock_held() {
        let log = SharedLog::ring(2).unwrap();
        let _guard = log.lock().unwrap();
        let rendered = format!("{:?}", log);
        assert!(rendered.contains("ring"));
    }
}
