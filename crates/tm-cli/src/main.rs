//! Tidemark CLI - incremental, partition-aware transformation runs

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::Cli;
use commands::{common, ls, plan, run, validate};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let result = match &cli.command {
        cli::Commands::Run(args) => run::execute(args, &cli.global).await,
        cli::Commands::Plan(args) => plan::execute(args, &cli.global).await,
        cli::Commands::Validate => validate::execute(&cli.global).await,
        cli::Commands::Ls(args) => ls::execute(args, &cli.global).await,
    };

    if let Err(e) = result {
        if let Some(code) = e.downcast_ref::<common::ExitCode>() {
            std::process::exit(code.0);
        }
        return Err(e);
    }
    Ok(())
}
