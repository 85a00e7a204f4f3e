//! Diagnostic sink
//!
//! Installed once at startup; every component logs through `tracing` and
//! never cares whether that ends up on the console, in a file, or nowhere.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    /// Nothing on the console.
    Off,
    /// Warnings and errors only.
    Normal,
    /// Everything down to debug.
    Verbose,
}

impl ConsoleLevel {
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        if quiet {
            ConsoleLevel::Off
        } else if verbose {
            ConsoleLevel::Verbose
        } else {
            ConsoleLevel::Normal
        }
    }

    fn filter(self) -> LevelFilter {
        match self {
            ConsoleLevel::Off => LevelFilter::OFF,
            ConsoleLevel::Normal => LevelFilter::WARN,
            ConsoleLevel::Verbose => LevelFilter::DEBUG,
        }
    }
}

/// `bootstrap-Oct19-1432.log` style name for the current run.
pub fn log_file_name() -> String {
    format!("bootstrap-{}.log", Local::now().format("%b%d-%H%M"))
}

/// Install the global subscriber. Returns the log file path when file
/// logging is enabled.
pub fn init(console: ConsoleLevel, log_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let console_layer = (console != ConsoleLevel::Off).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .with_filter(console.filter())
    });

    let (file_layer, log_path) = match log_dir {
        Some(dir) => {
            let path = dir.join(log_file_name());
            let file = File::create(&path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false)
                .with_filter(LevelFilter::DEBUG);
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(log_path)
}
