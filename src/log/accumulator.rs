//! Per-connection line accumulation
//!
//! Inbound bytes are buffered until a terminator arrives. A single transport
//! read may carry zero, one or many terminators, and a terminator may arrive
//! in a later read than the bytes it ends.
//!
//! Growth doubles the tracked capacity, starting from a seed, so total copy
//! cost stays linear in the bytes received. The buffer never shrinks.

use super::errors::{LogError, LogResult};
use super::record::{Record, RECORD_TERMINATOR};

/// Initial allocation for a fresh accumulator.
pub const DEFAULT_SEED_CAPACITY: usize = 64;

/// Growable byte buffer collecting one connection's partial record.
#[derive(Debug)]
pub struct LineAccumulator {
    /// Bytes received but not yet handed off; `buf.len()` is the cursor
    buf: Vec<u8>,
    /// Allocation size this accumulator has committed to
    capacity: usize,
    /// First allocation size
    seed_capacity: usize,
    /// Hard ceiling on buffered bytes
    max_bytes: Option<usize>,
    /// Reallocations performed so far
    growths: usize,
}

impl Default for LineAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl LineAccumulator {
    /// Creates an empty accumulator with the default seed.
    pub fn new() -> Self {
        Self::with_seed_capacity(DEFAULT_SEED_CAPACITY)
    }

    /// Creates an empty accumulator whose first allocation is `seed` bytes.
    ///
    /// Nothing is allocated until the first append.
    pub fn with_seed_capacity(seed: usize) -> Self {
        Self {
            buf: Vec::new(),
            capacity: 0,
            seed_capacity: seed.max(1),
            max_bytes: None,
            growths: 0,
        }
    }

    /// Caps the number of bytes this accumulator will hold.
    pub fn with_max_bytes(mut self, max_bytes: Option<usize>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current tracked allocation size.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of reallocations performed.
    pub fn growth_count(&self) -> usize {
        self.growths
    }

    /// The buffered, not yet terminated bytes.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Copies `bytes` in and returns the buffer indices of every terminator
    /// inside the newly appended span, in ascending order.
    ///
    /// # Errors
    ///
    /// `RINGLOG_OUT_OF_MEMORY` if growth fails or the ceiling would be
    /// exceeded. The buffer is left exactly as it was before the call.
    pub fn append(&mut self, bytes: &[u8]) -> LogResult<Vec<usize>> {
        let start = self.buf.len();
        let needed = start
            .checked_add(bytes.len())
            .ok_or_else(|| LogError::out_of_memory("Accumulator length overflow"))?;

        if let Some(max) = self.max_bytes {
            if needed > max {
                return Err(LogError::out_of_memory(format!(
                    "Pending record of {} bytes exceeds limit of {} bytes",
                    needed, max
                )));
            }
        }

        self.ensure_capacity(needed)?;
        self.buf.extend_from_slice(bytes);

        Ok(bytes
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == RECORD_TERMINATOR)
            .map(|(i, _)| start + i)
            .collect())
    }

    fn ensure_capacity(&mut self, needed: usize) -> LogResult<()> {
        if needed <= self.capacity {
            return Ok(());
        }

        let mut target = self.capacity.max(self.seed_capacity);
        while target < needed {
            target = target
                .checked_mul(2)
                .ok_or_else(|| LogError::out_of_memory("Accumulator capacity overflow"))?;
        }

        self.buf
            .try_reserve_exact(target - self.buf.len())
            .map_err(|e| LogError::out_of_memory_requesting(target, e))?;
        self.capacity = target;
        self.growths += 1;
        Ok(())
    }

    /// Removes `[0, terminator_index]` as a record and shifts any remaining
    /// bytes down to the front of the buffer.
    ///
    /// # Panics
    ///
    /// Panics if `terminator_index` is not inside the buffer.
    ///
    /// # Errors
    ///
    /// `RINGLOG_OUT_OF_MEMORY` if the record cannot be allocated. The buffer
    /// is untouched in that case.
    pub fn take_complete_record_up_to(&mut self, terminator_index: usize) -> LogResult<Record> {
        assert!(
            terminator_index < self.buf.len(),
            "terminator index {} outside accumulator of {} bytes",
            terminator_index,
            self.buf.len()
        );

        let record = Record::copy_from_slice(&self.buf[..=terminator_index])?;
        self.buf.drain(..=terminator_index);
        Ok(record)
    }

    /// Drops any buffered bytes. Capacity is kept.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_terminators_across_feeds() {
        let mut acc = LineAccumulator::new();

        assert!(acc.append(b"ab").unwrap().is_empty());
        let terminators = acc.append(b"c\nde\nf").unwrap();
        assert_eq!(terminators, vec![3, 6]);

        let first = acc.take_complete_record_up_to(3).unwrap();
        assert_eq!(first.as_bytes(), b"abc\n");
        assert_eq!(acc.pending(), b"de\nf");

        // Second terminator index shifts down by the consumed prefix
        let second = acc.take_complete_record_up_to(6 - 4).unwrap();
        assert_eq!(second.as_bytes(), b"de\n");
        assert_eq!(acc.pending(), b"f");
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn test_growth_is_geometric() {
        let mut acc = LineAccumulator::with_seed_capacity(64);
        let chunk = [b'x'; 10];
        for _ in 0..20 {
            assert!(acc.append(&chunk).unwrap().is_empty());
        }

        assert_eq!(acc.len(), 200);
        assert!(acc.pending().iter().all(|b| *b == b'x'));
        assert_eq!(acc.capacity(), 256);
        // 64 -> 128 -> 256
        assert_eq!(acc.growth_count(), 3);
    }

    #[test]
    fn test_single_large_append_grows_once() {
        let mut acc = LineAccumulator::with_seed_capacity(64);
        acc.append(&[b'y'; 200]).unwrap();
        assert_eq!(acc.capacity(), 256);
        assert_eq!(acc.growth_count(), 1);
    }

    #[test]
    fn test_capacity_never_shrinks() {
        let mut acc = LineAccumulator::with_seed_capacity(4);
        acc.append(b"0123456789\n").unwrap();
        let capacity = acc.capacity();
        acc.take_complete_record_up_to(10).unwrap();
        assert!(acc.is_empty());
        assert_eq!(acc.capacity(), capacity);
        assert!(acc.len() <= acc.capacity());
    }

    #[test]
    fn test_limit_reports_out_of_memory_without_corruption() {
        let mut acc = LineAccumulator::with_seed_capacity(8).with_max_bytes(Some(8));
        acc.append(b"abcd").unwrap();

        let err = acc.append(b"efghij").unwrap_err();
        assert_eq!(err.code().code(), "RINGLOG_OUT_OF_MEMORY");
        assert_eq!(acc.pending(), b"abcd");
    }

    #[test]
    fn test_terminator_only_record() {
        let mut acc = LineAccumulator::new();
        assert_eq!(acc.append(b"\n").unwrap(), vec![0]);
        assert_eq!(acc.take_complete_record_up_to(0).unwrap().as_bytes(), b"\n");
        assert!(acc.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_take_out_of_range_panics() {
        let mut acc = LineAccumulator::new();
        acc.append(b"ab").unwrap();
        let _ = acc.take_complete_record_up_to(5);
    }
}
