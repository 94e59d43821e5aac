//! Server configuration
//!
//! Loaded from a JSON file. Every field has a default, so an empty object
//! (or a missing file) yields the stock daemon behavior: port 9000,
//! unbounded file log at `/var/tmp/aesdsocketdata`, removed on shutdown.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::log::{FileBackendOptions, LogResult, SharedLog, DEFAULT_RING_CAPACITY, DEFAULT_SEED_CAPACITY};
use crate::observability::Severity;

use super::errors::{ServerError, ServerResult};

/// Which backing store the shared log uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Fixed-capacity in-memory ring
    Ring,
    /// Unbounded append-only file
    File,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to listen on (default: "0.0.0.0:9000")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Backing store (default: file)
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Ring slots when `backend` is ring (default: 10)
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,

    /// Log file when `backend` is file
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// sync_data after every file append (default: false)
    #[serde(default)]
    pub sync_on_commit: bool,

    /// Delete the log file once every session has drained (default: true)
    #[serde(default = "default_true")]
    pub remove_data_file_on_shutdown: bool,

    /// Transport read size (default: 1024)
    #[serde(default = "default_read_chunk_bytes")]
    pub read_chunk_bytes: usize,

    /// First accumulator allocation (default: 64)
    #[serde(default = "default_accumulator_seed_bytes")]
    pub accumulator_seed_bytes: usize,

    /// Ceiling on one session's unterminated bytes (default: none)
    #[serde(default)]
    pub max_pending_bytes: Option<usize>,

    /// Minimum log severity (default: "INFO")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How long a reply write may still run once shutdown is requested
    /// (default: 1000)
    #[serde(default = "default_drain_write_timeout_ms")]
    pub drain_write_timeout_ms: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:9000".to_string()
}

fn default_backend() -> BackendKind {
    BackendKind::File
}

fn default_ring_capacity() -> usize {
    DEFAULT_RING_CAPACITY
}

fn default_data_file() -> PathBuf {
    PathBuf::from("/var/tmp/aesdsocketdata")
}

fn default_true() -> bool {
    true
}

fn default_read_chunk_bytes() -> usize {
    1024
}

fn default_accumulator_seed_bytes() -> usize {
    DEFAULT_SEED_CAPACITY
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_drain_write_timeout_ms() -> u64 {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            backend: default_backend(),
            ring_capacity: default_ring_capacity(),
            data_file: default_data_file(),
            sync_on_commit: false,
            remove_data_file_on_shutdown: default_true(),
            read_chunk_bytes: default_read_chunk_bytes(),
            accumulator_seed_bytes: default_accumulator_seed_bytes(),
            max_pending_bytes: None,
            log_level: default_log_level(),
            drain_write_timeout_ms: default_drain_write_timeout_ms(),
        }
    }
}

impl ServerConfig {
    /// Bounded in-memory configuration listening on `listen_addr`.
    pub fn ring(listen_addr: impl Into<String>, capacity: usize) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            backend: BackendKind::Ring,
            ring_capacity: capacity,
            ..Default::default()
        }
    }

    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> ServerResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ServerError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Like `load`, but a missing file yields the defaults
    pub fn load_or_default(path: &Path) -> ServerResult<Self> {
        match fs::metadata(path) {
            Ok(_) => Self::load(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
            Err(e) => Err(ServerError::ConfigError(format!(
                "Failed to stat {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(content: &str) -> ServerResult<Self> {
        let config: ServerConfig = serde_json::from_str(content)
            .map_err(|e| ServerError::ConfigError(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> ServerResult<()> {
        if self.listen_addr.trim().is_empty() {
            return Err(ServerError::ConfigError("listen_addr must not be empty".into()));
        }

        if self.backend == BackendKind::Ring && self.ring_capacity == 0 {
            return Err(ServerError::ConfigError("ring_capacity must be >= 1".into()));
        }

        if self.backend == BackendKind::File && self.data_file.as_os_str().is_empty() {
            return Err(ServerError::ConfigError("data_file must not be empty".into()));
        }

        if self.read_chunk_bytes == 0 {
            return Err(ServerError::ConfigError("read_chunk_bytes must be >= 1".into()));
        }

        if self.accumulator_seed_bytes == 0 {
            return Err(ServerError::ConfigError(
                "accumulator_seed_bytes must be >= 1".into(),
            ));
        }

        if let Some(max) = self.max_pending_bytes {
            if max < self.accumulator_seed_bytes {
                return Err(ServerError::ConfigError(format!(
                    "max_pending_bytes ({}) must be >= accumulator_seed_bytes ({})",
                    max, self.accumulator_seed_bytes
                )));
            }
        }

        self.severity()?;
        Ok(())
    }

    /// Grace period for a reply write that is still running at shutdown
    pub fn drain_write_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_write_timeout_ms)
    }

    /// Parsed `log_level`
    pub fn severity(&self) -> ServerResult<Severity> {
        self.log_level
            .parse()
            .map_err(|e: String| ServerError::ConfigError(e))
    }

    /// Replace the port of `listen_addr`, keeping the host
    pub fn with_port(mut self, port: u16) -> Self {
        let host = match self.listen_addr.rsplit_once(':') {
            Some((host, _)) => host.to_string(),
            None => self.listen_addr.clone(),
        };
        self.listen_addr = format!("{}:{}", host, port);
        self
    }

    /// Open the configured backing store
    pub fn open_log(&self) -> LogResult<SharedLog> {
        match self.backend {
            BackendKind::Ring => SharedLog::ring(self.ring_capacity),
            BackendKind::File => SharedLog::file(
                &self.data_file,
                FileBackendOptions {
                    sync_on_commit: self.sync_on_commit,
                    remove_on_close: self.remove_data_file_on_shutdown,
                },
            ),
        }
    }
}
