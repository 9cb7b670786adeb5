//! ## tidsmaskin-cli
//! **Command-line front end for virtual clocks**
//! Installs a configured clock chain in this process and shows how time,
//! sleeps and manually driven timelines behave under it.
//!
//! ### Expectations:
//! - Logging is initialized before any clock is installed
//! - Exactly one clock is installed per invocation

use clap::Parser;
use tidsmaskin_telemetry::ClockLogger;

mod commands;
mod error;

use commands::Cli;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    ClockLogger::init()?;
    let cli = Cli::parse();
    commands::run_command(cli)?;
    Ok(())
}
