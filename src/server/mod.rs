//! Network daemon
//!
//! Accepts TCP connections, splits each byte stream into newline-terminated
//! records, commits every record to the shared log, and replies with the
//! full log contents after each commit.
//!
//! # Usage
//!
//! ```ignore
//! use ringlog::server::{serve, ServerConfig};
//!
//! let config = ServerConfig::ring("127.0.0.1:9000", 10);
//! serve(config, async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```

mod config;
mod errors;
mod listener;
mod registry;
mod session;
mod state;

use std::future::Future;

pub use config::{BackendKind, ServerConfig};
pub use errors::{ServerError, ServerResult};
pub use listener::LogServer;
pub use registry::{SessionGuard, SessionId, SessionInfo, SessionRegistry};
pub use session::{CloseReason, Session, SessionState};
pub use state::ServerState;

/// Opens the configured log, binds, and serves until `shutdown` completes.
pub async fn serve<F>(config: ServerConfig, shutdown: F) -> ServerResult<()>
where
    F: Future<Output = ()>,
{
    let state = ServerState::from_config(config)?;
    let server = LogServer::bind(state).await?;
    server.run_until(shutdown).await
}
