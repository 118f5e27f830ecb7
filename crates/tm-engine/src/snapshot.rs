//! Snapshot engine: Type-2 history tracking for slowly-changing entities.
//!
//! Per business key the history is a two-state machine: at most one Open
//! record (`tm_valid_to` NULL) and any number of Closed ones. Transitions are
//! computed as a pure delta from the current open records and the extract,
//! then applied in a single transaction. History is append-only; nothing is
//! ever purged here.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tm_core::key::{attribute_hash, KeyGenerator, SurrogateKey};
use tm_core::node::ModelNode;
use tm_core::sql::quote_ident;
use tm_core::value::{Rows, Value};
use tm_store::{Store, StoreError};

use crate::error::{EngineError, EngineResult};
use crate::executor::KEY_COLUMN;
use crate::orchestrator::CancelFlag;
use crate::plan::{PlanAction, RowCounts, RunPlan};

/// Digest of the tracked attribute values of a history row.
pub const ATTR_HASH_COLUMN: &str = "tm_attr_hash";
/// Inclusive validity start of a history row.
pub const VALID_FROM_COLUMN: &str = "tm_valid_from";
/// Exclusive validity end; NULL marks the Open record.
pub const VALID_TO_COLUMN: &str = "tm_valid_to";
/// Convenience flag mirroring `tm_valid_to IS NULL`.
pub const IS_CURRENT_COLUMN: &str = "tm_is_current";

const CHUNK_SIZE: usize = 500;

/// The transitions one run applies: rows to open (indices into the deduped
/// extract) and keys whose Open record closes at the run timestamp.
#[derive(Debug, Default, PartialEq)]
pub struct SnapshotDelta {
    pub opens: Vec<usize>,
    pub closes: Vec<String>,
}

/// Evaluate the transition rule once per observed key.
///
/// `open` maps each currently-open key to its attribute hash. Keys absent
/// from the extract are left open unless `close_deleted` is set. A key the
/// extract repeats counts once; the first occurrence wins.
pub fn compute_delta(
    open: &HashMap<String, String>,
    extracted: &[(SurrogateKey, String)],
    close_deleted: bool,
) -> SnapshotDelta {
    let mut delta = SnapshotDelta::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for (i, (key, hash)) in extracted.iter().enumerate() {
        if !seen.insert(key.as_str()) {
            continue;
        }
        match open.get(key.as_str()) {
            None => delta.opens.push(i),
            Some(current) if current == hash => {}
            Some(_) => {
                delta.closes.push(key.to_string());
                delta.opens.push(i);
            }
        }
    }

    if close_deleted {
        for key in open.keys() {
            if !seen.contains(key.as_str()) {
                delta.closes.push(key.clone());
            }
        }
    }

    delta
}

/// Applies snapshot plans: maintains the history table for one node.
pub struct SnapshotEngine {
    store: Arc<dyn Store>,
}

impl SnapshotEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Consume a snapshot plan and apply its transitions.
    pub async fn apply(
        &self,
        node: &ModelNode,
        plan: RunPlan,
        cancel: &CancelFlag,
    ) -> EngineResult<RowCounts> {
        let PlanAction::Snapshot { extract } = plan.action else {
            return Err(EngineError::Store(StoreError::Execution(format!(
                "non-snapshot plan for '{}' routed to the snapshot engine",
                node.name
            ))));
        };

        let rows = self.store.read(&extract).await?;
        let generator = KeyGenerator::new(node.name.as_str(), &node.unique_key)?;
        let extracted: Vec<(SurrogateKey, String)> = rows
            .iter()
            .map(|row| {
                (
                    generator.key_for_row(&row),
                    attribute_hash(&node.tracked_columns, &row),
                )
            })
            .collect();

        let target_name = node.target_relation();
        let target = node.quoted_target();
        let mut statements: Vec<String> = Vec::new();

        let open = if self.store.relation_exists(&target_name).await? {
            self.open_records(&target).await?
        } else {
            statements.push(self.create_history_table(&target, &extract).await?);
            HashMap::new()
        };

        let delta = compute_delta(&open, &extracted, node.close_deleted);
        let run_ts = Utc::now();

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled {
                node: node.name.to_string(),
            });
        }

        let updated = delta.closes.len();
        let inserted = delta.opens.len();
        statements.extend(close_statements(&target, &delta.closes, run_ts));
        statements.extend(open_statements(&target, &rows, &extracted, &delta.opens, run_ts));

        if !statements.is_empty() {
            self.store.atomic_write_batch(&statements).await?;
        }
        Ok(RowCounts::new(inserted, updated))
    }

    /// Key and attribute hash of every currently-open record.
    async fn open_records(&self, target: &str) -> EngineResult<HashMap<String, String>> {
        let sql = format!(
            "SELECT {}, {} FROM {} WHERE {} IS NULL",
            quote_ident(KEY_COLUMN),
            quote_ident(ATTR_HASH_COLUMN),
            target,
            quote_ident(VALID_TO_COLUMN)
        );
        let rows = self.store.read(&sql).await?;
        let mut open = HashMap::with_capacity(rows.len());
        for row in &rows.rows {
            if let (Some(Value::Text(key)), Some(Value::Text(hash))) = (row.first(), row.get(1)) {
                open.insert(key.clone(), hash.clone());
            }
        }
        Ok(open)
    }

    /// First-run DDL: the extract's shape plus the history tracking columns.
    async fn create_history_table(&self, target: &str, extract: &str) -> EngineResult<String> {
        let columns = self.store.describe(extract).await?;
        let col_defs: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.data_type))
            .chain([
                format!("{} VARCHAR", quote_ident(KEY_COLUMN)),
                format!("{} VARCHAR", quote_ident(ATTR_HASH_COLUMN)),
                format!("{} TIMESTAMP", quote_ident(VALID_FROM_COLUMN)),
                format!("{} TIMESTAMP", quote_ident(VALID_TO_COLUMN)),
                format!("{} BOOLEAN", quote_ident(IS_CURRENT_COLUMN)),
            ])
            .collect();
        Ok(format!("CREATE TABLE {} ({})", target, col_defs.join(", ")))
    }
}

/// Close each key's Open record at the run timestamp.
fn close_statements(target: &str, closes: &[String], run_ts: DateTime<Utc>) -> Vec<String> {
    let ts = Value::Timestamp(run_ts).to_sql_literal();
    closes
        .chunks(CHUNK_SIZE)
        .map(|chunk| {
            let keys = chunk
                .iter()
                .map(|k| format!("'{}'", k))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "UPDATE {} SET {} = {}, {} = FALSE WHERE {} IN ({}) AND {} IS NULL",
                target,
                quote_ident(VALID_TO_COLUMN),
                ts,
                quote_ident(IS_CURRENT_COLUMN),
                quote_ident(KEY_COLUMN),
                keys,
                quote_ident(VALID_TO_COLUMN)
            )
        })
        .collect()
}

/// Insert a new Open record per opened key.
fn open_statements(
    target: &str,
    rows: &Rows,
    extracted: &[(SurrogateKey, String)],
    opens: &[usize],
    run_ts: DateTime<Utc>,
) -> Vec<String> {
    if opens.is_empty() {
        return Vec::new();
    }
    let column_list: Vec<String> = rows
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .chain([
            quote_ident(KEY_COLUMN),
            quote_ident(ATTR_HASH_COLUMN),
            quote_ident(VALID_FROM_COLUMN),
            quote_ident(VALID_TO_COLUMN),
            quote_ident(IS_CURRENT_COLUMN),
        ])
        .collect();
    let column_list = column_list.join(", ");
    let ts = Value::Timestamp(run_ts).to_sql_literal();

    opens
        .chunks(CHUNK_SIZE)
        .map(|chunk| {
            let tuples: Vec<String> = chunk
                .iter()
                .map(|&i| {
                    let (key, hash) = &extracted[i];
                    let rendered: Vec<String> = rows.rows[i]
                        .iter()
                        .map(|v| v.to_sql_literal())
                        .chain([
                            format!("'{}'", key),
                            format!("'{}'", hash),
                            ts.clone(),
                            "NULL".to_string(),
                            "TRUE".to_string(),
                        ])
                        .collect();
                    format!("({})", rendered.join(", "))
                })
                .collect();
            format!(
                "INSERT INTO {} ({}) VALUES {}",
                target,
                column_list,
                tuples.join(", ")
            )
        })
        .collect()
}

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod tests;
