//! Inspect and change Windows display modes and per-monitor DPI scaling.
//!
//! [`engine::DisplayEngine`] is the entry point for embedding; the `windisplay`
//! binary is a thin CLI over it.

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::debug;

pub mod applier;
pub mod cli;
pub mod config;
pub mod dpi;
pub mod engine;
pub mod error;
pub mod logging;
pub mod mode;
pub mod platform;
pub mod preference;
pub mod source;
#[cfg(windows)]
pub mod windows_util;

#[cfg(test)]
mod fake;

pub use engine::DisplayEngine;
pub use error::DisplayError;

#[derive(Debug, Clone, clap::Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Lists monitors when omitted
    #[command(subcommand)]
    command: Option<cli::Command>,
}

pub fn run() -> Result<i32> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            e.print().context("Failed to print usage")?;
            return Ok(e.exit_code());
        }
    };

    let config = config::get()?;
    let _logging_guard = logging::setup(&config);
    debug!("Loaded config: {:?}", config);
    debug!("Running: {:?}", args);

    let command = args.command.unwrap_or_default();
    run_command(&command, &config)
}

#[cfg(windows)]
fn run_command(command: &cli::Command, config: &config::Config) -> Result<i32> {
    let engine = DisplayEngine::new(windows_util::WindowsDisplayApi::new());
    Ok(command.run(&engine, config)?.unwrap_or(0))
}

#[cfg(not(windows))]
fn run_command(command: &cli::Command, _config: &config::Config) -> Result<i32> {
    tracing::error!(
        "Cannot run {:?}: display configuration is only supported on Windows",
        command
    );
    Ok(1)
}
