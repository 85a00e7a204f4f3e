//! The `homebox` bootstrap command
//!
//! Loads configuration, installs the diagnostic sink, wires the real
//! process/network/terminal implementations into the orchestrator and turns
//! its outcome into a process exit code.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use crate::bootstrap::report::{Console, RunReport};
use crate::bootstrap::{Identity, SystemProber};
use crate::config::{HomePaths, HomeboxConfig};
use crate::exec::SystemRunner;
use crate::fetch::HttpFetcher;
use crate::logging::{self, ConsoleLevel};
use crate::orchestrator::Orchestrator;
use crate::secret::TerminalPrompt;

#[derive(Debug, Args, Clone, Default)]
pub struct BootstrapArgs {
    /// Disables console output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enables console debugging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enables debug logging to file
    #[arg(short, long)]
    pub log: bool,

    /// Execute advanced setup (optional Puppet modules)
    #[arg(short, long)]
    pub setup: bool,

    /// Configuration file (default: the per-user homebox config)
    #[arg(long, env = "HOMEBOX_CONFIG")]
    pub config: Option<PathBuf>,
}

fn load_config(args: &BootstrapArgs) -> Result<HomeboxConfig> {
    match &args.config {
        Some(path) => HomeboxConfig::load_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => HomeboxConfig::load().context("Failed to load configuration"),
    }
}

/// Run the full bootstrap and return the exit code to terminate with.
pub fn handle_bootstrap(args: &BootstrapArgs) -> Result<ExitCode> {
    let config = load_config(args)?;

    let log_dir = args.log.then_some(config.log_dir.as_path());
    if let Some(path) = logging::init(ConsoleLevel::from_flags(args.quiet, args.verbose), log_dir)? {
        info!("Logging to {}", path.display());
    }

    let paths = HomePaths::discover(&config).context("Failed to locate home directory")?;
    let runner = SystemRunner;
    let prober = SystemProber::new(&runner);
    let fetcher = HttpFetcher::new().context("Failed to build HTTP client")?;
    let console = Console::new(args.quiet);

    let orchestrator = Orchestrator {
        prober: &prober,
        runner: &runner,
        fetcher: &fetcher,
        prompt: &TerminalPrompt,
        config,
        paths,
        identity: Identity::current(&runner),
        console,
        advanced_setup: args.setup,
    };

    let mut report = RunReport::new();
    let result = orchestrator.run(&mut report);
    report.print_summary(&console);

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("❌ {e}");
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}
