//! tm-engine - Materialization engine for Tidemark
//!
//! Turns declarative node definitions into executed materializations:
//! the schema change guard, the planner that chooses a strategy per node,
//! the merge executor and snapshot engine that apply plans transactionally,
//! and the orchestrator that schedules graph runs with retries and
//! downstream-skip semantics.

pub mod error;
pub mod executor;
pub mod guard;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod snapshot;

pub use error::{EngineError, EngineResult};
pub use executor::MergeExecutor;
pub use orchestrator::{
    CancelFlag, GraphRunSummary, Orchestrator, RunOutcome, RunStatus, RunStatusReport,
};
pub use plan::{PlanAction, RowCounts, RunPlan, RunRequest};
pub use planner::Planner;
pub use snapshot::SnapshotEngine;
