//! Plan command implementation

use anyhow::Result;

use crate::cli::{GlobalArgs, PlanArgs};
use crate::commands::common::{self, load_project};

/// Execute the plan command: print the node's plan as JSON without running it.
pub async fn execute(args: &PlanArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let orchestrator = common::build_orchestrator(&project, None)?;

    let request = common::build_request(
        args.start.as_deref(),
        args.end.as_deref(),
        args.backfill,
        args.full_refresh,
    )?;

    let plan = orchestrator.plan_only(&args.node, &request).await?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
