//! Backing stores for the shared log
//!
//! Two implementations sit behind `LogBackend`:
//! - `RingStore`: bounded, in memory, evicts the oldest record
//! - `FileBackend`: unbounded, one named file opened for read and append
//!
//! Backends are not synchronized. The coordinator serializes every call.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::errors::{LogError, LogResult};
use super::record::Record;
use super::ring::RingStore;

/// Result of appending one record.
#[derive(Debug, Default)]
pub struct AppendOutcome {
    /// Record pushed out of a bounded store to make room
    pub evicted: Option<Record>,
}

/// Storage the coordinator appends to and snapshots from.
pub trait LogBackend: Send {
    /// Appends one record. A failed append leaves previously stored records intact.
    fn append(&mut self, record: Record) -> LogResult<AppendOutcome>;

    /// Returns every retained byte, oldest record first.
    fn snapshot(&mut self) -> LogResult<Vec<u8>>;

    /// Bytes a snapshot would currently return.
    fn retained_bytes(&self) -> u64;

    /// Records currently retained, when the store tracks them.
    fn record_count(&self) -> Option<usize>;

    /// Releases the store. Called once, after every session has drained.
    fn close(&mut self) -> LogResult<()>;

    /// Short name used in logs.
    fn kind(&self) -> &'static str;
}

impl LogBackend for RingStore {
    fn append(&mut self, record: Record) -> LogResult<AppendOutcome> {
        Ok(AppendOutcome {
            evicted: self.add_entry(record),
        })
    }

    fn snapshot(&mut self) -> LogResult<Vec<u8>> {
        let mut out = Vec::new();
        self.write_snapshot(&mut out)?;
        Ok(out)
    }

    fn retained_bytes(&self) -> u64 {
        RingStore::retained_bytes(self) as u64
    }

    fn record_count(&self) -> Option<usize> {
        Some(self.count())
    }

    fn close(&mut self) -> LogResult<()> {
        self.clear();
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "ring"
    }
}

/// Options for the file backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileBackendOptions {
    /// `sync_data` after every append
    pub sync_on_commit: bool,
    /// Delete the file on close
    pub remove_on_close: bool,
}

/// File handle the file backend writes through.
///
/// Writes must land at the end of the file. `File` opened in append mode
/// satisfies this.
pub trait LogFile: Read + Write + Seek + Send {
    /// Cuts the file to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Flushes file data to the device.
    fn sync(&mut self) -> io::Result<()>;
}

impl LogFile for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Unbounded append-only log kept in one file.
///
/// Opened read + append + create. Appends always land at the end of the
/// file; snapshots re-read it from the start.
///
/// A torn append is truncated away. If that truncation itself fails the
/// handle is dropped and every later call fails with `RINGLOG_IO_ERROR`,
/// so the partial bytes are never served.
#[derive(Debug)]
pub struct FileBackend<F: LogFile = File> {
    path: PathBuf,
    file: Option<F>,
    len: u64,
    options: FileBackendOptions,
    closed: bool,
}

impl FileBackend<File> {
    /// Opens or creates the log file at `path`.
    ///
    /// Existing content is kept and becomes the start of the log.
    ///
    /// # Errors
    ///
    /// `RINGLOG_IO_ERROR` if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>, options: FileBackendOptions) -> LogResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    LogError::io(
                        format!("Failed to create log directory: {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| {
                LogError::io(format!("Failed to open log file: {}", path.display()), e)
            })?;

        Self::with_file(path, file, options)
    }
}

impl<F: LogFile> FileBackend<F> {
    /// Wraps an already opened handle. `path` is only used for removal on
    /// close and in error messages.
    pub fn with_file(
        path: impl Into<PathBuf>,
        mut file: F,
        options: FileBackendOptions,
    ) -> LogResult<Self> {
        let path = path.into();
        let len = file.seek(SeekFrom::End(0)).map_err(|e| {
            LogError::io(format!("Failed to size log file: {}", path.display()), e)
        })?;

        Ok(Self {
            path,
            file: Some(file),
            len,
            options,
            closed: false,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a failed rollback has taken the file out of service.
    pub fn is_failed(&self) -> bool {
        !self.closed && self.file.is_none()
    }

    fn file_mut(&mut self) -> LogResult<&mut F> {
        if self.closed {
            return Err(LogError::closed());
        }
        let path = &self.path;
        self.file.as_mut().ok_or_else(|| {
            LogError::io(
                format!("Log file {} holds a torn record", path.display()),
                io::Error::new(io::ErrorKind::Other, "rollback after failed append did not complete"),
            )
        })
    }

    /// Cuts the file back to the last fully appended record.
    fn roll_back(&mut self) -> io::Result<()> {
        let len = self.len;
        match self.file.as_mut() {
            Some(file) => file.truncate(len),
            None => Ok(()),
        }
    }
}

impl<F: LogFile> LogBackend for FileBackend<F> {
    fn append(&mut self, record: Record) -> LogResult<AppendOutcome> {
        let sync = self.options.sync_on_commit;
        let file = self.file_mut()?;

        let written = file
            .write_all(record.as_bytes())
            .and_then(|_| if sync { file.sync() } else { file.flush() });

        if let Err(e) = written {
            if let Err(rollback) = self.roll_back() {
                self.file = None;
                return Err(LogError::io(
                    format!(
                        "Failed to roll back {} byte record after write error ({}); log file taken out of service",
                        record.len(),
                        e
                    ),
                    rollback,
                ));
            }
            return Err(LogError::io(
                format!("Failed to append {} byte record", record.len()),
                e,
            ));
        }

        self.len += record.len() as u64;
        Ok(AppendOutcome::default())
    }

    fn snapshot(&mut self) -> LogResult<Vec<u8>> {
        let expected = self.len;
        let file = self.file_mut()?;

        let mut out = Vec::new();
        out.try_reserve_exact(expected as usize)
            .map_err(|e| LogError::out_of_memory_requesting(expected as usize, e))?;

        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_to_end(&mut out))
            .map_err(|e| LogError::io("Failed to read log file", e))?;

        Ok(out)
    }

    fn retained_bytes(&self) -> u64 {
        self.len
    }

    fn record_count(&self) -> Option<usize> {
        None
    }

    fn close(&mut self) -> LogResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        drop(self.file.take());

        if self.options.remove_on_close {
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(LogError::io(
                        format!("Failed to remove log file: {}", self.path.display()),
                        e,
                    ))
                }
            }
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

impl<F: LogFile> Drop for FileBackend<F> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        drop(self.file.take());
        if self.options.remove_on_close {
            let _ = fs::remove_file(&self.path);
        }
    }
}
