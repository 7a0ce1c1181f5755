//! `mtme` - build task sets and summarize stored metric evaluation results.

use std::io::{self, Write as _};

use anyhow::Result;
use clap::Parser as _;
use cli::{Cli, Commands};
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

mod cli;
mod handlers;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(io::stderr)
        .init();

    let meta = handlers::registry(cli.meta_info.as_deref())?;
    let mut out = io::stdout().lock();

    match cli.command {
        Commands::Tasks { config } => handlers::handle_tasks(&mut out, &meta, &config)?,
        Commands::Show { results, probs } => handlers::handle_show(&mut out, &results, probs)?,
        Commands::Summarize {
            results,
            weight_by,
            split_by,
        } => handlers::handle_summarize(&mut out, &results, &weight_by, split_by)?,
    }

    out.flush()?;
    Ok(())
}
