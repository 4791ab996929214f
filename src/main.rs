use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use jobweaver::presentation::cli::commands;
use jobweaver::presentation::cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("jobweaver=debug,info")
    } else {
        EnvFilter::new("jobweaver=info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    commands::run(&cli.command)
}
