//! Fixed-capacity ring of variable-length records
//!
//! The occupied slots, read from the oldest, are the logical log in commit
//! order. Inserting into a full ring evicts exactly the oldest record.
//!
//! A logical offset is a byte position in the concatenation of all retained
//! records, oldest first. Eviction shifts which record is oldest, so the
//! offset to slot mapping is recomputed on every lookup.
//!
//! The ring is not synchronized. Callers hold the coordinator lock.

use super::errors::{LogError, LogResult};
use super::record::Record;

/// Default number of slots.
pub const DEFAULT_RING_CAPACITY: usize = 10;

/// Bounded circular store of records.
#[derive(Debug)]
pub struct RingStore {
    /// Slot storage, `None` when empty
    slots: Vec<Option<Record>>,
    /// Slot that receives the next insert
    write_index: usize,
    /// Occupied slots
    count: usize,
    /// Sum of retained record sizes
    retained_bytes: usize,
}

impl RingStore {
    /// Allocates `capacity` empty slots.
    ///
    /// # Errors
    ///
    /// `RINGLOG_CAPACITY_INVARIANT` when `capacity` is zero.
    pub fn new(capacity: usize) -> LogResult<Self> {
        if capacity == 0 {
            return Err(LogError::capacity_invariant(capacity));
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|e| LogError::out_of_memory_requesting(capacity, e))?;
        slots.resize_with(capacity, || None);

        Ok(Self {
            slots,
            write_index: 0,
            count: 0,
            retained_bytes: 0,
        })
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether no record is retained.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether the next insert will evict.
    pub fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    /// Total bytes across retained records.
    pub fn retained_bytes(&self) -> usize {
        self.retained_bytes
    }

    /// Slot index of the oldest retained record.
    fn oldest_index(&self) -> usize {
        (self.write_index + self.capacity() - self.count) % self.capacity()
    }

    /// Inserts `record`, returning the evicted oldest record if the ring was full.
    ///
    /// The evicted record is taken out of its slot before the new one is
    /// installed, so the slot never holds two records and the caller decides
    /// when the evicted storage is released.
    pub fn add_entry(&mut self, record: Record) -> Option<Record> {
        let evicted = if self.is_full() {
            // When full, the oldest record sits exactly at the write index.
            self.slots[self.write_index].take()
        } else {
            None
        };

        match &evicted {
            Some(old) => self.retained_bytes -= old.len(),
            None => self.count += 1,
        }

        self.retained_bytes += record.len();
        self.slots[self.write_index] = Some(record);
        self.write_index = (self.write_index + 1) % self.capacity();

        evicted
    }

    /// Retained records from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Record> + '_ {
        let start = self.oldest_index();
        let capacity = self.capacity();
        (0..self.count).filter_map(move |i| self.slots[(start + i) % capacity].as_ref())
    }

    /// Maps a logical offset to the record containing it.
    ///
    /// Returns the record and the offset within it, or `None` when
    /// `logical_offset` is at or past the end of retained data. Zero-length
    /// records never contain an offset and are skipped.
    pub fn find_entry_for_offset(&self, logical_offset: usize) -> Option<(&Record, usize)> {
        let mut remaining = logical_offset;
        for record in self.iter() {
            if remaining < record.len() {
                return Some((record, remaining));
            }
            remaining -= record.len();
        }
        None
    }

    /// Copies up to `max_len` bytes of the virtual log starting at `logical_offset`.
    ///
    /// The copy crosses record boundaries. Returns an empty buffer at or past
    /// the end of retained data.
    pub fn read_at(&self, logical_offset: usize, max_len: usize) -> LogResult<Vec<u8>> {
        let available = self.retained_bytes.saturating_sub(logical_offset);
        let len = available.min(max_len);

        let mut out = Vec::new();
        out.try_reserve_exact(len)
            .map_err(|e| LogError::out_of_memory_requesting(len, e))?;

        let mut pos = logical_offset;
        while out.len() < len {
            let Some((record, offset)) = self.find_entry_for_offset(pos) else {
                break;
            };
            let take = (record.len() - offset).min(len - out.len());
            out.extend_from_slice(&record.as_bytes()[offset..offset + take]);
            pos += take;
        }

        Ok(out)
    }

    /// Appends every retained record, oldest first, to `out`.
    pub fn write_snapshot(&self, out: &mut Vec<u8>) -> LogResult<()> {
        out.try_reserve(self.retained_bytes)
            .map_err(|e| LogError::out_of_memory_requesting(self.retained_bytes, e))?;
        for record in self.iter() {
            out.extend_from_slice(record.as_bytes());
        }
        Ok(())
    }

    /// Releases every retained record.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.write_index = 0;
        self.count = 0;
        self.retained_bytes = 0;
    }
}
