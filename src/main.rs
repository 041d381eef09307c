//! Tasklock: lease-based exclusive locks for background tasks.
//!
//! This is the main entry point for the `tasklock` CLI. It parses arguments,
//! dispatches to the appropriate command handler, and handles errors with
//! proper exit codes.

mod cli;
mod commands;

use cli::Cli;
use std::process::ExitCode;
use tasklock::exit_codes;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    match commands::dispatch(cli) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);
            if let Some(hint) = commands::error_hint(&err) {
                eprintln!("Hint: {}", hint);
            }

            ExitCode::from(err.exit_code() as u8)
        }
    }
}
