//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Tidemark - incremental, partition-aware transformation runs
#[derive(Parser, Debug)]
#[command(name = "tm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Materialize nodes through the orchestrator
    Run(RunArgs),

    /// Print a node's execution plan without running it
    Plan(PlanArgs),

    /// Load the project and check nodes and graph for errors
    Validate,

    /// List nodes in dependency order
    Ls(LsArgs),
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Node names to run (comma-separated, default: all)
    #[arg(short, long)]
    pub nodes: Option<String>,

    /// Graph selector (+node for ancestors, node+ for descendants)
    #[arg(short, long)]
    pub select: Option<String>,

    /// Explicit window start ("YYYY-MM-DD" or "YYYY-MM-DD HH:MM:SS", UTC)
    #[arg(long)]
    pub start: Option<String>,

    /// Explicit window end (exclusive; requires --start)
    #[arg(long)]
    pub end: Option<String>,

    /// Authorize reprocessing a window behind the watermark
    #[arg(long)]
    pub backfill: bool,

    /// Rebuild incremental targets from scratch
    #[arg(long)]
    pub full_refresh: bool,

    /// Override the configured worker count
    #[arg(short, long)]
    pub workers: Option<usize>,
}

/// Arguments for the plan command
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Node to plan
    pub node: String,

    /// Explicit window start
    #[arg(long)]
    pub start: Option<String>,

    /// Explicit window end (exclusive; requires --start)
    #[arg(long)]
    pub end: Option<String>,

    /// Authorize reprocessing a window behind the watermark
    #[arg(long)]
    pub backfill: bool,

    /// Plan a full rebuild regardless of target state
    #[arg(long)]
    pub full_refresh: bool,
}

/// Arguments for the ls command
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: LsOutput,
}

/// List output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsOutput {
    /// One line per node with mode and dependencies
    Table,
    /// JSON array
    Json,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
