//! Orchestrator: the boundary that turns run requests into planner and
//! executor invocations, serializes per-node execution, retries transient
//! failures, and skips downstream nodes when an upstream fails.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use uuid::Uuid;

use tm_core::config::RetryConfig;
use tm_core::node::ModelNode;
use tm_core::node_name::NodeName;
use tm_core::{CoreError, DependencyGraph, SchemaBaselines};
use tm_store::Store;

use crate::error::{EngineError, EngineResult};
use crate::executor::MergeExecutor;
use crate::plan::{PlanAction, RowCounts, RunPlan, RunRequest};
use crate::planner::Planner;
use crate::snapshot::SnapshotEngine;

/// Shared cancellation signal for one run.
///
/// Executors check it between their read phase and the transactional write
/// batch, so a cancelled run always leaves the target in its pre-run
/// committed state.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Status of a node run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Terminal report of one submitted run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub node: NodeName,
    pub status: RunStatus,
    pub rows: Option<RowCounts>,
    pub error: Option<String>,
    pub attempts: u32,
}

/// Answer to a status query for a registered run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatusReport {
    pub status: RunStatus,
    pub error_detail: Option<String>,
}

/// Aggregate of one graph run.
#[derive(Debug, Clone, Serialize)]
pub struct GraphRunSummary {
    pub results: Vec<RunOutcome>,
}

impl GraphRunSummary {
    pub fn count(&self, status: RunStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.status == RunStatus::Succeeded)
    }
}

struct RunRecord {
    node: NodeName,
    status: RunStatus,
    error: Option<String>,
    cancel: CancelFlag,
}

/// Dispatches node runs against one backing store.
///
/// At most one run per node is in flight at a time: a per-node async mutex
/// serializes concurrent requests so a full rebuild and an append can never
/// interleave on the same target.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    nodes: HashMap<NodeName, ModelNode>,
    graph: DependencyGraph,
    planner: Planner,
    executor: MergeExecutor,
    snapshots: SnapshotEngine,
    baselines: Mutex<SchemaBaselines>,
    baselines_path: Option<PathBuf>,
    retry: RetryConfig,
    workers: usize,
    node_locks: HashMap<NodeName, Arc<tokio::sync::Mutex<()>>>,
    runs: Mutex<HashMap<String, RunRecord>>,
}

impl Orchestrator {
    /// Build an orchestrator over a validated node set.
    pub fn new(
        store: Arc<dyn Store>,
        nodes: Vec<ModelNode>,
        workers: usize,
        retry: RetryConfig,
        baselines_path: Option<PathBuf>,
    ) -> EngineResult<Self> {
        for node in &nodes {
            node.validate()?;
        }
        let graph = DependencyGraph::build(&nodes)?;

        let baselines = match &baselines_path {
            Some(path) => SchemaBaselines::load(path)?,
            None => SchemaBaselines::new(),
        };

        let node_locks = nodes
            .iter()
            .map(|n| (n.name.clone(), Arc::new(tokio::sync::Mutex::new(()))))
            .collect();
        let nodes = nodes.into_iter().map(|n| (n.name.clone(), n)).collect();

        Ok(Self {
            planner: Planner::new(Arc::clone(&store)),
            executor: MergeExecutor::new(Arc::clone(&store)),
            snapshots: SnapshotEngine::new(Arc::clone(&store)),
            store,
            nodes,
            graph,
            baselines: Mutex::new(baselines),
            baselines_path,
            retry,
            workers,
            node_locks,
            runs: Mutex::new(HashMap::new()),
        })
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn node(&self, name: &str) -> Option<&ModelNode> {
        self.nodes.get(name)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Produce a node's plan without executing it. The guard still runs,
    /// but nothing is written and the baseline file is not updated.
    pub async fn plan_only(&self, node: &str, request: &RunRequest) -> EngineResult<RunPlan> {
        let model = self.nodes.get(node).ok_or_else(|| CoreError::NodeNotFound {
            name: node.to_string(),
        })?;
        self.planner.plan(model, request, &self.baselines, 1).await
    }

    /// Submit one node run and drive it to a terminal status.
    pub async fn submit(&self, node: &str, request: RunRequest) -> RunOutcome {
        let run_id = self.register(NodeName::new(node));
        self.drive(run_id, node, request).await
    }

    /// Submit one node run without waiting for it. The run id is returned
    /// immediately, so [`status`](Self::status) and [`cancel`](Self::cancel)
    /// can observe the run while it is still in flight; the join handle
    /// resolves to the terminal [`RunOutcome`].
    pub fn submit_background(
        self: &Arc<Self>,
        node: &str,
        request: RunRequest,
    ) -> (String, tokio::task::JoinHandle<RunOutcome>) {
        let run_id = self.register(NodeName::new(node));
        let orchestrator = Arc::clone(self);
        let node = node.to_string();
        let id = run_id.clone();
        let handle =
            tokio::spawn(async move { orchestrator.drive(id, &node, request).await });
        (run_id, handle)
    }

    async fn drive(&self, run_id: String, node: &str, request: RunRequest) -> RunOutcome {
        let Some(model) = self.nodes.get(node) else {
            let error = CoreError::NodeNotFound {
                name: node.to_string(),
            }
            .to_string();
            return self.finish(&run_id, RunStatus::Failed, None, Some(error), 1);
        };

        // Serialize runs per node; requests for distinct nodes proceed freely.
        let lock = Arc::clone(&self.node_locks[&model.name]);
        let _guard = lock.lock().await;

        self.set_status(&run_id, RunStatus::Running);
        let cancel = self.cancel_flag(&run_id);
        let (result, attempts) = self.run_with_retries(model, &request, &cancel).await;

        match result {
            Ok(rows) => self.finish(&run_id, RunStatus::Succeeded, Some(rows), None, attempts),
            Err(e) => self.finish(&run_id, RunStatus::Failed, None, Some(e.to_string()), attempts),
        }
    }

    /// Run a selection of nodes level by level.
    ///
    /// Nodes inside a level run concurrently, bounded by the worker count; a
    /// level starts only when the previous one has finished. A failed node
    /// puts its transitive dependents into `Skipped` so nothing executes
    /// against stale upstream data.
    pub async fn run_graph(
        self: &Arc<Self>,
        selection: &[NodeName],
        defaults: RunRequest,
    ) -> EngineResult<GraphRunSummary> {
        let levels = self.graph.execution_levels(selection)?;
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let failed: Arc<Mutex<HashSet<NodeName>>> = Arc::new(Mutex::new(HashSet::new()));
        let results: Arc<Mutex<Vec<RunOutcome>>> = Arc::new(Mutex::new(Vec::new()));

        for level in levels {
            let mut handles = Vec::with_capacity(level.len());
            for name in level {
                let orchestrator = Arc::clone(self);
                let semaphore = Arc::clone(&semaphore);
                let failed = Arc::clone(&failed);
                let results = Arc::clone(&results);
                let request = defaults.clone();

                handles.push(tokio::spawn(async move {
                    let skip = failed
                        .lock()
                        .unwrap_or_else(|p| p.into_inner())
                        .contains(&name);
                    let outcome = if skip {
                        orchestrator.record_skip(&name)
                    } else {
                        let _permit = match semaphore.acquire().await {
                            Ok(permit) => permit,
                            Err(_) => return,
                        };
                        orchestrator.submit(&name, request).await
                    };

                    if outcome.status == RunStatus::Failed {
                        let mut failed = failed.lock().unwrap_or_else(|p| p.into_inner());
                        for dependent in orchestrator.graph.transitive_dependents(&name) {
                            failed.insert(dependent);
                        }
                        failed.insert(name);
                    }
                    results
                        .lock()
                        .unwrap_or_else(|p| p.into_inner())
                        .push(outcome);
                }));
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    log::warn!("run task join error: {}", e);
                }
            }
        }

        let mut results = results
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        // Report in dependency order regardless of completion order
        let position: HashMap<&NodeName, usize> =
            selection.iter().enumerate().map(|(i, n)| (n, i)).collect();
        results.sort_by_key(|r| position.get(&r.node).copied().unwrap_or(usize::MAX));

        Ok(GraphRunSummary { results })
    }

    /// Status of a registered run.
    pub fn status(&self, run_id: &str) -> Option<RunStatusReport> {
        let runs = self.runs.lock().unwrap_or_else(|p| p.into_inner());
        runs.get(run_id).map(|r| RunStatusReport {
            status: r.status,
            error_detail: r.error.clone(),
        })
    }

    /// Request cancellation of an in-flight run. Returns false for an
    /// unknown run id. A cancelled run terminates as `failed` with a
    /// cancellation detail.
    pub fn cancel(&self, run_id: &str) -> bool {
        let runs = self.runs.lock().unwrap_or_else(|p| p.into_inner());
        match runs.get(run_id) {
            Some(record) => {
                record.cancel.cancel();
                true
            }
            None => false,
        }
    }

    async fn run_with_retries(
        &self,
        node: &ModelNode,
        request: &RunRequest,
        cancel: &CancelFlag,
    ) -> (EngineResult<RowCounts>, u32) {
        let mut backoff = Duration::from_millis(self.retry.backoff_ms);
        let cap = Duration::from_millis(self.retry.backoff_cap_ms);
        let mut attempt: u32 = 1;

        loop {
            let result = self.attempt(node, request, attempt, cancel).await;
            match result {
                Err(ref e)
                    if e.is_transient()
                        && attempt < self.retry.max_attempts
                        && !cancel.is_cancelled() =>
                {
                    log::warn!(
                        "transient failure on '{}' (attempt {}/{}): {}; retrying in {:?}",
                        node.name,
                        attempt,
                        self.retry.max_attempts,
                        e,
                        backoff.min(cap)
                    );
                    tokio::time::sleep(backoff.min(cap)).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                other => return (other, attempt),
            }
        }
    }

    /// One full attempt: replan from scratch, then execute.
    async fn attempt(
        &self,
        node: &ModelNode,
        request: &RunRequest,
        attempt: u32,
        cancel: &CancelFlag,
    ) -> EngineResult<RowCounts> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled {
                node: node.name.to_string(),
            });
        }

        let plan = self
            .planner
            .plan(node, request, &self.baselines, attempt)
            .await?;
        // Guard acceptance is durable even if execution later fails
        self.save_baselines();

        if matches!(plan.action, PlanAction::Snapshot { .. }) {
            self.snapshots.apply(node, plan, cancel).await
        } else {
            self.executor.execute(node, plan, cancel).await
        }
    }

    fn save_baselines(&self) {
        if let Some(path) = &self.baselines_path {
            let baselines = self.baselines.lock().unwrap_or_else(|p| p.into_inner());
            if let Err(e) = baselines.save(path) {
                log::warn!("failed to save schema baselines: {}", e);
            }
        }
    }

    fn register(&self, node: NodeName) -> String {
        let run_id = Uuid::new_v4().to_string()[..8].to_string();
        let mut runs = self.runs.lock().unwrap_or_else(|p| p.into_inner());
        runs.insert(
            run_id.clone(),
            RunRecord {
                node,
                status: RunStatus::Pending,
                error: None,
                cancel: CancelFlag::new(),
            },
        );
        run_id
    }

    fn set_status(&self, run_id: &str, status: RunStatus) {
        let mut runs = self.runs.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(record) = runs.get_mut(run_id) {
            record.status = status;
        }
    }

    fn cancel_flag(&self, run_id: &str) -> CancelFlag {
        let runs = self.runs.lock().unwrap_or_else(|p| p.into_inner());
        runs.get(run_id)
            .map(|r| r.cancel.clone())
            .unwrap_or_default()
    }

    fn record_skip(&self, node: &NodeName) -> RunOutcome {
        let run_id = self.register(node.clone());
        self.finish(
            &run_id,
            RunStatus::Skipped,
            None,
            Some("skipped: upstream failure".to_string()),
            0,
        )
    }

    fn finish(
        &self,
        run_id: &str,
        status: RunStatus,
        rows: Option<RowCounts>,
        error: Option<String>,
        attempts: u32,
    ) -> RunOutcome {
        let mut runs = self.runs.lock().unwrap_or_else(|p| p.into_inner());
        let node = match runs.get_mut(run_id) {
            Some(record) => {
                record.status = status;
                record.error.clone_from(&error);
                record.node.clone()
            }
            None => NodeName::new("<unregistered>"),
        };
        RunOutcome {
            run_id: run_id.to_string(),
            node,
            status,
            rows,
            error,
            attempts,
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
