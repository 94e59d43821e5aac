//! Shared append-only log
//!
//! The log is one growing stream fed by many concurrent producers.
//!
//! # Components
//!
//! - `Record`: immutable committed bytes
//! - `RingStore`: fixed-capacity ring with oldest-first eviction and
//!   offset-addressed reads
//! - `LineAccumulator`: per-connection buffer that cuts records at the
//!   terminator
//! - `SharedLog`: serializes append + snapshot as one critical section over
//!   a ring or a file backend
//! - `RingDevice`: character-device style handle over a ring
//!
//! # Invariants
//!
//! - Records appear in lock-acquisition order
//! - No reader ever observes a partially appended record
//! - Two appends never interleave their bytes

mod accumulator;
mod backend;
mod coordinator;
mod device;
mod errors;
mod record;
mod ring;

pub use accumulator::{LineAccumulator, DEFAULT_SEED_CAPACITY};
pub use backend::{AppendOutcome, FileBackend, FileBackendOptions, LogBackend, LogFile};
pub use coordinator::{CommitReceipt, SharedLog, Snapshot};
pub use device::{DeviceFile, RingDevice};
pub use errors::{ErrorSeverity, LogError, LogErrorCode, LogResult};
pub use record::{Record, RECORD_TERMINATOR};
pub use ring::{RingStore, DEFAULT_RING_CAPACITY};
