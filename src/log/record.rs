//! Committed log records
//!
//! A record is created once, when a terminator completes it, and is never
//! modified afterwards. It is dropped when the ring evicts it.

use std::fmt;

use super::errors::{LogError, LogResult};

/// Byte that terminates a record on ingestion.
pub const RECORD_TERMINATOR: u8 = b'\n';

/// One immutable unit of the log.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Record {
    data: Box<[u8]>,
}

impl Record {
    /// Wraps an already owned buffer.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: data.into_boxed_slice(),
        }
    }

    /// Copies `bytes` into a freshly allocated record.
    ///
    /// # Errors
    ///
    /// `RINGLOG_OUT_OF_MEMORY` if the allocation cannot be satisfied.
    pub fn copy_from_slice(bytes: &[u8]) -> LogResult<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(bytes.len())
            .map_err(|e| LogError::out_of_memory_requesting(bytes.len(), e))?;
        data.extend_from_slice(bytes);
        Ok(Self::new(data))
    }

    /// Record contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Record size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the record holds zero bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the record ends with the ingestion terminator.
    pub fn is_terminated(&self) -> bool {
        self.data.last() == Some(&RECORD_TERMINATOR)
    }

    /// Consumes the record and returns its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data.into_vec()
    }
}

impl From<&[u8]> for Record {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

impl From<&str> for Record {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }
}

impl AsRef<[u8]> for Record {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("len", &self.data.len())
            .field("data", &String::from_utf8_lossy(&self.data))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_from_slice_preserves_bytes() {
        let record = Record::copy_from_slice(b"hello\n").unwrap();
        assert_eq!(record.as_bytes(), b"hello\n");
        assert_eq!(record.len(), 6);
        assert!(record.is_terminated());
    }

    #[test]
    fn test_zero_length_record() {
        let record = Record::copy_from_slice(b"").unwrap();
        assert!(record.is_empty());
        assert!(!record.is_terminated());
    }

    #[test]
    fn test_into_bytes() {
        let record = Record::from("abc\n");
        assert_eq!(record.into_bytes(), b"abc\n".to_vec());
    }
}
