//! Process-wide server state
//!
//! Built once by the bootstrap and shared by the accept loop and every
//! session. The bootstrap owns it and closes the log only after the registry
//! reports drain-complete.

use std::sync::Arc;

use crate::log::{LineAccumulator, SharedLog};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};

use super::config::ServerConfig;
use super::errors::ServerResult;
use super::registry::SessionRegistry;

/// Everything the accept loop and sessions share
#[derive(Debug)]
pub struct ServerState {
    pub config: ServerConfig,
    pub log: Arc<SharedLog>,
    pub registry: Arc<SessionRegistry>,
    pub metrics: Arc<MetricsRegistry>,
}

impl ServerState {
    /// Wraps an already opened log.
    pub fn new(config: ServerConfig, log: SharedLog) -> Arc<Self> {
        Arc::new(Self {
            config,
            log: Arc::new(log),
            registry: Arc::new(SessionRegistry::new()),
            metrics: Arc::new(MetricsRegistry::new()),
        })
    }

    /// Opens the configured backend and builds the state around it.
    pub fn from_config(config: ServerConfig) -> ServerResult<Arc<Self>> {
        let log = config.open_log()?;
        log_event_with_fields(Event::BackendOpened, &[("backend", log.kind())]);
        Ok(Self::new(config, log))
    }

    /// A fresh accumulator sized per configuration.
    pub fn new_accumulator(&self) -> LineAccumulator {
        LineAccumulator::with_seed_capacity(self.config.accumulator_seed_bytes)
            .with_max_bytes(self.config.max_pending_bytes)
    }
}
