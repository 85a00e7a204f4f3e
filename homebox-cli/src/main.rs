use clap::Parser;
use std::process::ExitCode;

use homebox_cli::commands::bootstrap::{BootstrapArgs, handle_bootstrap};

/// Bootstraps Mac or Fedora/CentOS systems for HomeBox.
#[derive(Parser)]
#[command(name = "homebox", version, about)]
struct Cli {
    #[command(flatten)]
    bootstrap: BootstrapArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match handle_bootstrap(&cli.bootstrap) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
