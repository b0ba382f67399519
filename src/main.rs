//! Loop Architect CLI
//!
//! Command-line interface for the Loop Architect slicer.

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;

use looparch::cli::{commands, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Loop Architect v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Analyze { input } => commands::analyze(&input),
        Commands::Slice {
            input,
            stem,
            output,
            options,
        } => commands::slice(&input, &stem, &output, options.resolve()?),
        Commands::Pack {
            input,
            output,
            keep_intermediate,
            no_previews,
            options,
        } => commands::pack(
            &input,
            &output,
            options.resolve()?,
            keep_intermediate,
            !no_previews,
        ),
    }
}
