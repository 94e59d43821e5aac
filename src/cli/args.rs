//! CLI argument definitions using clap
//!
//! Commands:
//! - ringlog serve [--config <path>] [--port <port>]
//! - ringlog check-config --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ringlog - a TCP append log that echoes the whole log after every record
#[derive(Parser, Debug)]
#[command(name = "ringlog")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve until SIGINT or SIGTERM
    Serve {
        /// Path to configuration file (defaults apply if absent)
        #[arg(long, default_value = "./ringlog.json")]
        config: PathBuf,

        /// Override the port of `listen_addr`
        #[arg(long)]
        port: Option<u16>,
    },

    /// Validate a configuration file and print the effective settings
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./ringlog.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_with_port() {
        let cli = Cli::try_parse_from(["ringlog", "serve", "--port", "9100"]).unwrap();
        match cli.command {
            Command::Serve { config, port } => {
                assert_eq!(config, PathBuf::from("./ringlog.json"));
                assert_eq!(port, Some(9100));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_config() {
        let cli =
            Cli::try_parse_from(["ringlog", "check-config", "--config", "/etc/ringlog.json"]).unwrap();
        assert!(matches!(cli.command, Command::CheckConfig { .. }));
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(Cli::try_parse_from(["ringlog", "serve", "--port", "70000"]).is_err());
    }
}
