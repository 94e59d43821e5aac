//! CLI command implementations
//!
//! `serve` owns the process lifecycle:
//! 1. Configuration load (defaults if the file is absent)
//! 2. Backend open
//! 3. Bind and serve
//! 4. On SIGINT/SIGTERM: stop accepting, drain sessions, close the backend

use std::path::Path;

use serde_json::json;

use crate::observability::{log_event_with_fields, Event, Logger};
use crate::server::{LogServer, ServerConfig, ServerState};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config, port } => serve(&config, port),
        Command::CheckConfig { config } => check_config(&config),
    }
}

/// Load the effective configuration for `serve`.
pub fn load_config(config_path: &Path, port: Option<u16>) -> CliResult<ServerConfig> {
    let mut config = ServerConfig::load_or_default(config_path)?;
    if let Some(port) = port {
        config = config.with_port(port);
    }
    config.validate()?;
    Ok(config)
}

/// Serve until SIGINT or SIGTERM
pub fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    let config = load_config(config_path, port)?;
    Logger::set_min_severity(config.severity()?);

    let path = config_path.display().to_string();
    log_event_with_fields(
        Event::ConfigLoaded,
        &[("path", &path), ("listen_addr", &config.listen_addr)],
    );

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::io_error(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async move {
        log_event_with_fields(Event::ServerStarting, &[("listen_addr", &config.listen_addr)]);

        let state = ServerState::from_config(config)?;
        let server = LogServer::bind(state).await?;
        server.run_until(shutdown_signal()).await?;
        Ok::<(), CliError>(())
    })
}

/// Validate a configuration file and print it with defaults filled in
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = ServerConfig::load(config_path)?;
    write_response(json!({ "config": serde_json::to_value(&config)? }))
}

/// Completes on the first SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            let message = e.to_string();
            Logger::error("SIGNAL_HANDLER_FAILED", &[("signal", "SIGINT"), ("error", &message)]);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                let message = e.to_string();
                Logger::error("SIGNAL_HANDLER_FAILED", &[("signal", "SIGTERM"), ("error", &message)]);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(&temp_dir.path().join("ringlog.json"), None).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_load_config_applies_port_override() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ringlog.json");
        fs::write(&path, r#"{"listen_addr": "127.0.0.1:9000", "backend": "ring"}"#).unwrap();

        let config = load_config(&path, Some(9200)).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9200");
    }

    #[test]
    fn test_load_config_invalid_json_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ringlog.json");
        fs::write(&path, "{ not json").unwrap();

        let err = load_config(&path, None).unwrap_err();
        assert_eq!(err.code_str(), "RINGLOG_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_check_config_requires_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = check_config(&temp_dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.code_str(), "RINGLOG_CLI_CONFIG_ERROR");
    }
}
