//! CLI module for ringlog
//!
//! Provides command-line interface for:
//! - serve: Run the daemon until SIGINT/SIGTERM
//! - check-config: Validate and print the effective configuration

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check_config, load_config, run, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::write_response;
