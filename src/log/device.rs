//! Character-device style access to a ring
//!
//! Mirrors the in-kernel variant of the log: every writer shares one pending
//! entry, and a write whose last byte is the terminator commits the whole
//! pending entry as a single record. Reads address the virtual log by byte
//! position, so a reader can walk the log with repeated short reads.
//!
//! `DeviceFile` gives each opener its own file position and implements
//! `Read`, `Write` and `Seek`.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use super::accumulator::LineAccumulator;
use super::errors::{LogError, LogErrorCode, LogResult};
use super::record::RECORD_TERMINATOR;
use super::ring::RingStore;

struct DeviceState {
    ring: RingStore,
    pending: LineAccumulator,
}

/// A ring plus the shared pending entry, behind one lock.
pub struct RingDevice {
    state: Mutex<DeviceState>,
}

impl RingDevice {
    /// Creates a device over a ring of `capacity` slots.
    pub fn new(capacity: usize) -> LogResult<Self> {
        Ok(Self {
            state: Mutex::new(DeviceState {
                ring: RingStore::new(capacity)?,
                pending: LineAccumulator::new(),
            }),
        })
    }

    fn lock(&self) -> LogResult<MutexGuard<'_, DeviceState>> {
        self.state.lock().map_err(|_| LogError::lock_poisoned())
    }

    /// Accepts `bytes` into the pending entry and commits it when `bytes`
    /// ends with the terminator. Returns the number of bytes accepted.
    ///
    /// A zero-length write is a no-op.
    pub fn write(&self, bytes: &[u8]) -> LogResult<usize> {
        if bytes.is_empty() {
            return Ok(0);
        }

        let mut state = self.lock()?;
        state.pending.append(bytes)?;

        if bytes.last() == Some(&RECORD_TERMINATOR) {
            let end = state.pending.len() - 1;
            let record = state.pending.take_complete_record_up_to(end)?;
            // Evicted record is released here, outside the slot.
            drop(state.ring.add_entry(record));
        }

        Ok(bytes.len())
    }

    /// Copies up to `count` bytes of the virtual log starting at `pos`.
    pub fn read(&self, pos: usize, count: usize) -> LogResult<Vec<u8>> {
        self.lock()?.ring.read_at(pos, count)
    }

    /// Bytes retained in the ring.
    pub fn size(&self) -> LogResult<usize> {
        Ok(self.lock()?.ring.retained_bytes())
    }

    /// Committed entries currently retained.
    pub fn entry_count(&self) -> LogResult<usize> {
        Ok(self.lock()?.ring.count())
    }

    /// Bytes written but not yet terminated.
    pub fn pending_len(&self) -> LogResult<usize> {
        Ok(self.lock()?.pending.len())
    }

    /// Opens a handle positioned at the start of the log.
    pub fn open(self: &Arc<Self>) -> DeviceFile {
        DeviceFile {
            device: Arc::clone(self),
            pos: 0,
        }
    }
}

fn to_io_error(err: LogError) -> io::Error {
    let kind = match err.code() {
        LogErrorCode::RingLogOutOfMemory => io::ErrorKind::OutOfMemory,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}

/// One opener's view of a `RingDevice`.
pub struct DeviceFile {
    device: Arc<RingDevice>,
    pos: usize,
}

impl DeviceFile {
    /// Current file position.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl Read for DeviceFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let bytes = self.device.read(self.pos, buf.len()).map_err(to_io_error)?;
        buf[..bytes.len()].copy_from_slice(&bytes);
        self.pos += bytes.len();
        Ok(bytes.len())
    }
}

impl Write for DeviceFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.device.write(buf).map_err(to_io_error)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for DeviceFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let invalid = |message: &'static str| io::Error::new(io::ErrorKind::InvalidInput, message);

        let size = self.device.size().map_err(to_io_error)?;
        let target = match pos {
            SeekFrom::Start(offset) => i64::try_from(offset).ok(),
            SeekFrom::Current(delta) => i64::try_from(self.pos)
                .ok()
                .and_then(|pos| pos.checked_add(delta)),
            SeekFrom::End(delta) => i64::try_from(size)
                .ok()
                .and_then(|size| size.checked_add(delta)),
        }
        .ok_or_else(|| invalid("seek offset overflows"))?;

        if target < 0 {
            return Err(invalid("seek before start of log"));
        }

        self.pos = usize::try_from(target).map_err(|_| invalid("seek offset overflows"))?;
        Ok(target as u64)
    }
}
