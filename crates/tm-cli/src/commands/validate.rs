//! Validate command implementation

use anyhow::Result;

use tm_core::DependencyGraph;

use crate::cli::GlobalArgs;
use crate::commands::common::{load_project, ExitCode};

/// Execute the validate command: load the project, validate every node,
/// and check the graph for cycles and unknown dependencies.
pub async fn execute(global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;

    let mut errors = 0;
    for node in &project.nodes {
        if let Err(e) = node.validate() {
            println!("  \u{2717} {}", e);
            errors += 1;
        }
    }

    match DependencyGraph::build(&project.nodes) {
        Ok(graph) => {
            if global.verbose {
                for name in graph.topological_order()? {
                    eprintln!("[verbose] {}", name);
                }
            }
        }
        Err(e) => {
            println!("  \u{2717} {}", e);
            errors += 1;
        }
    }

    if errors > 0 {
        println!("\nValidation failed: {} error(s)", errors);
        return Err(ExitCode(1).into());
    }
    println!(
        "\u{2713} Project '{}' is valid ({} nodes)",
        project.config.name,
        project.nodes.len()
    );
    Ok(())
}
