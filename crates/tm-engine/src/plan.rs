//! Execution plans: the inspectable value the planner hands to an executor.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tm_core::node_name::NodeName;
use tm_core::window::PartitionWindow;

/// A run request as received from an external orchestrating caller.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Explicit window start (requires `end` as well)
    pub start: Option<DateTime<Utc>>,

    /// Explicit window end (requires `start` as well)
    pub end: Option<DateTime<Utc>>,

    /// Authorizes reprocessing of a window before the current watermark;
    /// requires both bounds
    pub backfill: bool,

    /// Force a full rebuild regardless of target state
    pub full_refresh: bool,
}

/// What an executor must do to materialize one node.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PlanAction {
    /// View node: nothing is written, the plan only marks the trace
    NoOp,

    /// Table node: one atomic replace of the whole target
    Replace { statement: String },

    /// Incremental node on full load: rebuild the target with a surrogate
    /// key computed per row
    RebuildKeyed { extract: String },

    /// Incremental node with a resolved window: append rows whose surrogate
    /// key is not already present
    AppendKeyed {
        extract: String,
        window: PartitionWindow,
    },

    /// Snapshot node: delegate to the snapshot engine
    Snapshot { extract: String },
}

impl PlanAction {
    /// Short strategy label for logs and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            PlanAction::NoOp => "no-op",
            PlanAction::Replace { .. } => "replace",
            PlanAction::RebuildKeyed { .. } => "rebuild",
            PlanAction::AppendKeyed { .. } => "append",
            PlanAction::Snapshot { .. } => "snapshot",
        }
    }
}

/// One node's plan for one attempt.
///
/// Created by the planner, consumed by value exactly once; a retry replans
/// from scratch with an incremented attempt count.
#[derive(Debug, Clone, Serialize)]
pub struct RunPlan {
    /// Node this plan materializes
    pub node: NodeName,

    /// The chosen strategy and its generated statement(s)
    pub action: PlanAction,

    /// DDL propagating accepted schema additions to the target, applied
    /// before any row write in the same transaction
    pub schema_changes: Vec<String>,

    /// 1-based attempt count
    pub attempt: u32,

    /// When this plan was produced
    pub planned_at: DateTime<Utc>,
}

/// Rows written by one plan execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    pub inserted: usize,
    pub updated: usize,
}

impl RowCounts {
    pub fn new(inserted: usize, updated: usize) -> Self {
        Self { inserted, updated }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_serializes_for_inspection() {
        let plan = RunPlan {
            node: NodeName::new("reviews"),
            action: PlanAction::RebuildKeyed {
                extract: "SELECT * FROM src_reviews".to_string(),
            },
            schema_changes: Vec::new(),
            attempt: 1,
            planned_at: Utc::now(),
        };

        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["node"], "reviews");
        assert_eq!(json["action"]["strategy"], "rebuild_keyed");
        assert_eq!(json["attempt"], 1);
    }

    #[test]
    fn test_action_labels() {
        assert_eq!(PlanAction::NoOp.label(), "no-op");
        assert_eq!(
            PlanAction::Snapshot {
                extract: String::new()
            }
            .label(),
            "snapshot"
        );
    }
}
