//! List command implementation

use anyhow::Result;
use serde::Serialize;

use tm_core::DependencyGraph;

use crate::cli::{GlobalArgs, LsArgs, LsOutput};
use crate::commands::common::load_project;

#[derive(Debug, Serialize)]
struct NodeInfo {
    name: String,
    materialized: String,
    schema: Option<String>,
    depends_on: Vec<String>,
}

/// Execute the ls command: print nodes in dependency order.
pub async fn execute(args: &LsArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let graph = DependencyGraph::build(&project.nodes)?;

    let info: Vec<NodeInfo> = graph
        .topological_order()?
        .iter()
        .filter_map(|name| project.nodes.iter().find(|n| &n.name == name))
        .map(|node| NodeInfo {
            name: node.name.to_string(),
            materialized: node.materialized.to_string(),
            schema: node.schema.clone(),
            depends_on: node.depends_on.iter().map(|d| d.to_string()).collect(),
        })
        .collect();

    match args.output {
        LsOutput::Table => {
            for node in &info {
                if node.depends_on.is_empty() {
                    println!("{} ({})", node.name, node.materialized);
                } else {
                    println!(
                        "{} ({}) <- {}",
                        node.name,
                        node.materialized,
                        node.depends_on.join(", ")
                    );
                }
            }
        }
        LsOutput::Json => println!("{}", serde_json::to_string_pretty(&info)?),
    }
    Ok(())
}
