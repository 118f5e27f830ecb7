//! Run command implementation

use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use tm_engine::{RunOutcome, RunStatus};

use crate::cli::{GlobalArgs, RunArgs};
use crate::commands::common::{self, load_project, ExitCode};

/// Contents of run_results.json for one graph run.
#[derive(Debug, Serialize)]
struct RunResults {
    run_id: String,
    timestamp: DateTime<Utc>,
    elapsed_secs: f64,
    success_count: usize,
    failure_count: usize,
    skipped_count: usize,
    results: Vec<RunOutcome>,
}

/// Execute the run command
pub async fn execute(args: &RunArgs, global: &GlobalArgs) -> Result<()> {
    let start_time = Instant::now();
    let project = load_project(global)?;
    let orchestrator = common::build_orchestrator(&project, args.workers)?;

    let selection = common::resolve_selection(
        orchestrator.graph(),
        args.nodes.as_deref(),
        args.select.as_deref(),
    )?;
    if selection.is_empty() {
        println!("No nodes to run.");
        return Ok(());
    }

    let request = common::build_request(
        args.start.as_deref(),
        args.end.as_deref(),
        args.backfill,
        args.full_refresh,
    )?;

    if global.verbose {
        eprintln!(
            "[verbose] Running {} nodes in order: {:?}",
            selection.len(),
            selection
        );
    }
    println!("Running {} nodes...\n", selection.len());

    let summary = orchestrator.run_graph(&selection, request).await?;
    for outcome in &summary.results {
        print_outcome(outcome);
    }

    let success_count = summary.count(RunStatus::Succeeded);
    let failure_count = summary.count(RunStatus::Failed);
    let skipped_count = summary.count(RunStatus::Skipped);
    println!(
        "\nCompleted: {} succeeded, {} failed, {} skipped [{:.2}s]",
        success_count,
        failure_count,
        skipped_count,
        start_time.elapsed().as_secs_f64()
    );

    let results = RunResults {
        run_id: Uuid::new_v4().to_string()[..8].to_string(),
        timestamp: Utc::now(),
        elapsed_secs: start_time.elapsed().as_secs_f64(),
        success_count,
        failure_count,
        skipped_count,
        results: summary.results,
    };
    // The console report above is the primary output; a results file that
    // cannot be written should not turn a successful run into a failure.
    if let Err(e) =
        common::write_json_results(&project.config.run_results_path(&project.root), &results)
    {
        log::warn!("Failed to write run results: {e}");
    }

    if failure_count > 0 {
        return Err(ExitCode(1).into());
    }
    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome.status {
        RunStatus::Succeeded => {
            let rows = outcome.rows.unwrap_or_default();
            let attempts = if outcome.attempts > 1 {
                format!(" [attempt {}]", outcome.attempts)
            } else {
                String::new()
            };
            println!(
                "  \u{2713} {} - {} inserted, {} updated{}",
                outcome.node, rows.inserted, rows.updated, attempts
            );
        }
        RunStatus::Skipped => {
            println!("  - {} - skipped (upstream failure)", outcome.node);
        }
        _ => {
            println!(
                "  \u{2717} {} - {}",
                outcome.node,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}
