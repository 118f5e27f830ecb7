//! Shared helpers for CLI commands: project loading, selection, output.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

use tm_core::{discover_nodes, DependencyGraph, ModelNode, NodeName, ProjectConfig};
use tm_engine::{Orchestrator, RunRequest};
use tm_store::{DuckDbStore, Store};

use crate::cli::GlobalArgs;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and cleanup happens properly.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Intentionally empty: ExitCode is a control-flow mechanism, not a
        // user-facing error.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// A loaded project: configuration plus the discovered node set.
pub(crate) struct Project {
    pub(crate) root: PathBuf,
    pub(crate) config: ProjectConfig,
    pub(crate) nodes: Vec<ModelNode>,
}

impl Project {
    pub(crate) fn target_dir(&self) -> PathBuf {
        self.root.join(&self.config.target_path)
    }
}

/// Load tidemark.yml and the node definitions it points at.
pub(crate) fn load_project(global: &GlobalArgs) -> Result<Project> {
    let root = Path::new(&global.project_dir).to_path_buf();
    let config = ProjectConfig::load_from_dir(&root).context("Failed to load project")?;
    let nodes = discover_nodes(&root, &config.node_paths).context("Failed to load nodes")?;

    if global.verbose {
        eprintln!(
            "[verbose] Loaded project '{}' with {} nodes",
            config.name,
            nodes.len()
        );
    }
    Ok(Project { root, config, nodes })
}

/// Build the orchestrator over the project's configured store.
pub(crate) fn build_orchestrator(
    project: &Project,
    workers_override: Option<usize>,
) -> Result<Arc<Orchestrator>> {
    std::fs::create_dir_all(project.target_dir())
        .context("Failed to create target directory")?;

    let store = DuckDbStore::new(&project.config.store_path(&project.root))
        .context("Failed to open store")?;
    let workers = workers_override.unwrap_or(project.config.workers).max(1);

    let orchestrator = Orchestrator::new(
        Arc::new(store) as Arc<dyn Store>,
        project.nodes.clone(),
        workers,
        project.config.retry,
        Some(project.config.baselines_path(&project.root)),
    )?;
    Ok(Arc::new(orchestrator))
}

/// Resolve which nodes to run, in dependency order.
///
/// `--nodes` wins over `--select`; with neither, every node runs.
pub(crate) fn resolve_selection(
    graph: &DependencyGraph,
    nodes: Option<&str>,
    select: Option<&str>,
) -> Result<Vec<NodeName>> {
    if let Some(csv) = nodes {
        let requested: Vec<NodeName> = csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(NodeName::new)
            .collect();
        for name in &requested {
            if !graph.contains(name) {
                bail!("Unknown node: {}", name);
            }
        }
        return order_by_graph(graph, requested);
    }

    if let Some(selector) = select {
        let selected = graph.select(selector).context("Invalid selector")?;
        return order_by_graph(graph, selected);
    }

    graph.topological_order().map_err(Into::into)
}

fn order_by_graph(graph: &DependencyGraph, selected: Vec<NodeName>) -> Result<Vec<NodeName>> {
    let order = graph.topological_order()?;
    let mut ordered: Vec<NodeName> = order
        .into_iter()
        .filter(|n| selected.contains(n))
        .collect();
    // Selected names absent from the order would have failed lookup above
    ordered.dedup();
    Ok(ordered)
}

/// Assemble a run request from CLI window flags.
pub(crate) fn build_request(
    start: Option<&str>,
    end: Option<&str>,
    backfill: bool,
    full_refresh: bool,
) -> Result<RunRequest> {
    Ok(RunRequest {
        start: start.map(parse_timestamp).transpose()?,
        end: end.map(parse_timestamp).transpose()?,
        backfill,
        full_refresh,
    })
}

/// Parse a UTC timestamp: full "YYYY-MM-DD HH:MM:SS" or a bare date, which
/// means midnight.
pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d.and_hms_opt(0, 0, 0).unwrap().and_utc());
    }
    bail!("Invalid timestamp '{}': expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS", s)
}

/// Write a serializable result file under the target directory.
pub(crate) fn write_json_results<T: Serialize>(path: &Path, results: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
