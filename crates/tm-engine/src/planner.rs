//! Materialization planner: chooses a strategy per node and assembles the
//! window, key, and schema inputs into an execution plan.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tm_core::node::{Materialization, ModelNode};
use tm_core::window::{resolve_window, WindowResolution};
use tm_core::{CoreError, SchemaBaselines};
use tm_store::Store;

use crate::error::EngineResult;
use crate::guard::enforce_schema_policy;
use crate::plan::{PlanAction, RunPlan, RunRequest};

/// Produces [`RunPlan`]s for nodes. The schema change guard always runs
/// before a plan is emitted; a guard failure short-circuits planning.
pub struct Planner {
    store: Arc<dyn Store>,
}

impl Planner {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Plan one attempt for one node.
    pub async fn plan(
        &self,
        node: &ModelNode,
        request: &RunRequest,
        baselines: &Mutex<SchemaBaselines>,
        attempt: u32,
    ) -> EngineResult<RunPlan> {
        let schema_changes = enforce_schema_policy(self.store.as_ref(), node, baselines).await?;

        if (request.start.is_some() || request.end.is_some())
            && !node.materialized.is_incremental()
        {
            log::debug!(
                "node '{}' is {}; ignoring request window",
                node.name,
                node.materialized
            );
        }

        let action = match node.materialized {
            Materialization::View => PlanAction::NoOp,
            Materialization::Table => PlanAction::Replace {
                statement: format!(
                    "CREATE OR REPLACE TABLE {} AS ({})",
                    node.quoted_target(),
                    node.select
                ),
            },
            Materialization::Incremental => self.plan_incremental(node, request).await?,
            Materialization::Snapshot => PlanAction::Snapshot {
                extract: node.select.clone(),
            },
        };

        Ok(RunPlan {
            node: node.name.clone(),
            action,
            schema_changes,
            attempt,
            planned_at: Utc::now(),
        })
    }

    async fn plan_incremental(
        &self,
        node: &ModelNode,
        request: &RunRequest,
    ) -> EngineResult<PlanAction> {
        if request.backfill && (request.start.is_none() || request.end.is_none()) {
            return Err(CoreError::InvalidWindow {
                reason: "backfill requires both start and end".to_string(),
            }
            .into());
        }

        if request.full_refresh {
            log::debug!("full refresh requested for '{}'", node.name);
            return Ok(PlanAction::RebuildKeyed {
                extract: node.select.clone(),
            });
        }

        let current_max = self.read_watermark(node).await?;

        // A non-backfill explicit window that reaches behind the watermark
        // would reprocess committed rows; only a backfill authorizes that.
        if let (Some(start), false, Some(max_seen)) = (request.start, request.backfill, current_max)
        {
            if start < max_seen {
                return Err(CoreError::InvalidWindow {
                    reason: format!(
                        "explicit start {} precedes watermark {} (use a backfill to reprocess)",
                        start, max_seen
                    ),
                }
                .into());
            }
        }

        match resolve_window(request.start, request.end, current_max, Utc::now())? {
            WindowResolution::FullLoad => {
                log::debug!("no watermark for '{}'; planning full load", node.name);
                Ok(PlanAction::RebuildKeyed {
                    extract: node.select.clone(),
                })
            }
            WindowResolution::Window(window) => {
                let column = incremental_column(node)?;
                log::debug!("resolved window {} for '{}'", window, node.name);
                Ok(PlanAction::AppendKeyed {
                    extract: format!(
                        "SELECT * FROM ({}) AS src WHERE {}",
                        node.select,
                        window.filter_sql(column)
                    ),
                    window,
                })
            }
        }
    }

    /// Maximum already-processed value of the incremental column, or `None`
    /// when the target is absent or empty.
    async fn read_watermark(&self, node: &ModelNode) -> EngineResult<Option<DateTime<Utc>>> {
        if !self.store.relation_exists(&node.target_relation()).await? {
            return Ok(None);
        }
        let column = incremental_column(node)?;
        let sql = format!(
            "SELECT MAX({}) FROM {}",
            tm_core::sql::quote_ident(column),
            node.quoted_target()
        );
        let rows = self.store.read(&sql).await?;
        Ok(rows.scalar().and_then(|v| v.as_timestamp()))
    }
}

// Node validation guarantees this for incremental nodes; an unvalidated
// node surfaces a config error rather than a panic.
fn incremental_column(node: &ModelNode) -> EngineResult<&str> {
    node.incremental_column.as_deref().ok_or_else(|| {
        CoreError::InvalidNode {
            name: node.name.to_string(),
            reason: "incremental nodes require 'incremental_column'".to_string(),
        }
        .into()
    })
}

#[cfg(test)]
#[path = "planner_test.rs"]
mod tests;
