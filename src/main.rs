//! ringlog entry point
//!
//! Parses arguments and dispatches via `cli::run`. Errors go to stderr and
//! the process exits with status 1.

use ringlog::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
