//! ringlog - a TCP append log with bounded in-memory or file-backed storage
//!
//! Clients send newline-terminated records; each record is committed to a
//! shared log and the client receives the whole log back.
//!
//! - `log`: record storage, accumulation, and the commit coordinator
//! - `server`: tokio TCP daemon and session lifecycle
//! - `observability`: JSON-line logging and counters
//! - `cli`: command line entry

pub mod cli;
pub mod log;
pub mod observability;
pub mod server;
