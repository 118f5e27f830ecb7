//! Merge executor: applies replace and keyed-append plans against the store.

use std::collections::HashSet;
use std::sync::Arc;

use tm_core::key::{KeyGenerator, SurrogateKey};
use tm_core::node::{ConflictPolicy, ModelNode};
use tm_core::sql::quote_ident;
use tm_core::value::Rows;
use tm_store::{Store, StoreError};

use crate::error::{EngineError, EngineResult};
use crate::orchestrator::CancelFlag;
use crate::plan::{PlanAction, RowCounts, RunPlan};

/// Column carrying the surrogate key on keyed targets.
pub const KEY_COLUMN: &str = "tm_key";

/// Rows per generated INSERT / IN-list statement.
const CHUNK_SIZE: usize = 500;

/// Applies a plan's write phase as one transaction, so a failed or
/// cancelled run leaves the target in its pre-run committed state.
pub struct MergeExecutor {
    store: Arc<dyn Store>,
}

impl MergeExecutor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Consume a plan and apply it. Snapshot plans belong to the snapshot
    /// engine and are rejected here.
    pub async fn execute(
        &self,
        node: &ModelNode,
        plan: RunPlan,
        cancel: &CancelFlag,
    ) -> EngineResult<RowCounts> {
        match plan.action {
            PlanAction::NoOp => Ok(RowCounts::default()),
            PlanAction::Replace { statement } => {
                if cancel.is_cancelled() {
                    return Err(cancelled(node));
                }
                self.store.atomic_write(&statement).await?;
                let inserted = self.store.row_count(&node.target_relation()).await?;
                Ok(RowCounts::new(inserted, 0))
            }
            PlanAction::RebuildKeyed { extract } => {
                self.rebuild_keyed(node, &extract, cancel).await
            }
            PlanAction::AppendKeyed { extract, .. } => {
                self.append_keyed(node, &extract, &plan.schema_changes, cancel)
                    .await
            }
            PlanAction::Snapshot { .. } => Err(EngineError::Store(StoreError::Execution(
                format!("snapshot plan for '{}' routed to the merge executor", node.name),
            ))),
        }
    }

    /// Full rebuild that still computes a surrogate key per row: the target
    /// is replaced atomically with the keyed extract.
    async fn rebuild_keyed(
        &self,
        node: &ModelNode,
        extract: &str,
        cancel: &CancelFlag,
    ) -> EngineResult<RowCounts> {
        let rows = self.store.read(extract).await?;
        let keyed = keyed_rows(node, &rows)?;
        let columns = self.store.describe(extract).await?;

        if cancel.is_cancelled() {
            return Err(cancelled(node));
        }

        let target = node.quoted_target();
        let col_defs: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.data_type))
            .chain(std::iter::once(format!(
                "{} VARCHAR",
                quote_ident(KEY_COLUMN)
            )))
            .collect();

        let mut statements = vec![format!(
            "CREATE OR REPLACE TABLE {} ({})",
            target,
            col_defs.join(", ")
        )];
        let inserted = keyed.len();
        statements.extend(insert_statements(&target, &rows.columns, &keyed));

        self.store.atomic_write_batch(&statements).await?;
        Ok(RowCounts::new(inserted, 0))
    }

    /// Windowed append: rows whose surrogate key is new are inserted;
    /// colliding keys follow the node's conflict policy.
    async fn append_keyed(
        &self,
        node: &ModelNode,
        extract: &str,
        schema_changes: &[String],
        cancel: &CancelFlag,
    ) -> EngineResult<RowCounts> {
        let rows = self.store.read(extract).await?;
        let keyed = keyed_rows(node, &rows)?;

        let target_name = node.target_relation();
        let target = node.quoted_target();
        let mut statements: Vec<String> = Vec::new();

        let existing = if self.store.relation_exists(&target_name).await? {
            statements.extend(schema_changes.iter().cloned());
            self.existing_keys(&target, &keyed).await?
        } else {
            // Explicit-window first run: the target is created from the
            // extract's shape, so every key is new and any accepted
            // column additions are already part of the CREATE.
            let columns = self.store.describe(extract).await?;
            let col_defs: Vec<String> = columns
                .iter()
                .map(|c| format!("{} {}", quote_ident(&c.name), c.data_type))
                .chain(std::iter::once(format!(
                    "{} VARCHAR",
                    quote_ident(KEY_COLUMN)
                )))
                .collect();
            statements.push(format!(
                "CREATE TABLE {} ({})",
                target,
                col_defs.join(", ")
            ));
            HashSet::new()
        };

        let (to_insert, updated) = match node.on_conflict {
            ConflictPolicy::NoOp => {
                let fresh: Vec<(SurrogateKey, &[tm_core::Value])> = keyed
                    .iter()
                    .filter(|(key, _)| !existing.contains(key.as_str()))
                    .map(|(key, values)| (key.clone(), *values))
                    .collect();
                (fresh, 0)
            }
            ConflictPolicy::Update => {
                let colliding: Vec<&SurrogateKey> = keyed
                    .iter()
                    .map(|(key, _)| key)
                    .filter(|key| existing.contains(key.as_str()))
                    .collect();
                for chunk in colliding.chunks(CHUNK_SIZE) {
                    statements.push(format!(
                        "DELETE FROM {} WHERE {} IN ({})",
                        target,
                        quote_ident(KEY_COLUMN),
                        in_list(chunk.iter().map(|k| k.as_str()))
                    ));
                }
                (keyed.clone(), colliding.len())
            }
        };

        if cancel.is_cancelled() {
            return Err(cancelled(node));
        }

        // Colliding keys under the update policy are rewritten in place,
        // so they count as updates, not inserts.
        let inserted = to_insert.len() - updated;
        statements.extend(insert_statements(&target, &rows.columns, &to_insert));

        if !statements.is_empty() {
            self.store.atomic_write_batch(&statements).await?;
        }
        Ok(RowCounts::new(inserted, updated))
    }

    /// Which of the extract's keys already exist in the target.
    async fn existing_keys(
        &self,
        target: &str,
        keyed: &[(SurrogateKey, &[tm_core::Value])],
    ) -> EngineResult<HashSet<String>> {
        let mut existing = HashSet::new();
        for chunk in keyed.chunks(CHUNK_SIZE) {
            let sql = format!(
                "SELECT {} FROM {} WHERE {} IN ({})",
                quote_ident(KEY_COLUMN),
                target,
                quote_ident(KEY_COLUMN),
                in_list(chunk.iter().map(|(key, _)| key.as_str()))
            );
            for row in self.store.read(&sql).await?.rows {
                if let Some(tm_core::Value::Text(key)) = row.first() {
                    existing.insert(key.clone());
                }
            }
        }
        Ok(existing)
    }
}

/// Pair every extract row with its surrogate key, keeping the first
/// occurrence when the extract itself repeats a key.
fn keyed_rows<'a>(
    node: &ModelNode,
    rows: &'a Rows,
) -> EngineResult<Vec<(SurrogateKey, &'a [tm_core::Value])>> {
    let generator = KeyGenerator::new(node.name.as_str(), &node.unique_key)?;
    let mut seen: HashSet<SurrogateKey> = HashSet::new();
    let mut keyed = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let key = generator.key_for_row(&row);
        if seen.insert(key.clone()) {
            keyed.push((key, row.values()));
        }
    }
    Ok(keyed)
}

/// Chunked INSERT statements carrying the source columns plus the key.
fn insert_statements(
    target: &str,
    columns: &[String],
    keyed: &[(SurrogateKey, &[tm_core::Value])],
) -> Vec<String> {
    if keyed.is_empty() {
        return Vec::new();
    }
    let column_list: Vec<String> = columns
        .iter()
        .map(|c| quote_ident(c))
        .chain(std::iter::once(quote_ident(KEY_COLUMN)))
        .collect();
    let column_list = column_list.join(", ");

    keyed
        .chunks(CHUNK_SIZE)
        .map(|chunk| {
            let tuples: Vec<String> = chunk
                .iter()
                .map(|(key, values)| {
                    let rendered: Vec<String> = values
                        .iter()
                        .map(|v| v.to_sql_literal())
                        .chain(std::iter::once(format!("'{}'", key)))
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

fn in_list<'a>(keys: impl Iterator<Item = &'a str>) -> String {
    keys.map(|k| format!("'{}'", k))
        .collect::<Vec<_>>()
        .join(", ")
}

fn cancelled(node: &ModelNode) -> EngineError {
    EngineError::Cancelled {
        node: node.name.to_string(),
    }
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;
