//! Schema change guard: drift detection against the stored baseline.

use std::sync::Mutex;

use tm_core::node::{ModelNode, SchemaPolicy};
use tm_core::schema::SchemaSnapshot;
use tm_core::sql::quote_ident;
use tm_core::{CoreError, SchemaBaselines};
use tm_store::Store;

use crate::error::EngineResult;

/// Capture the observed schema of `node`'s extract and enforce its
/// schema-change policy against the stored baseline.
///
/// On acceptance the observed snapshot replaces the in-memory baseline
/// (callers persist it; a drift abort leaves the stored file untouched so
/// the next run re-detects the same drift). The first-ever run has nothing
/// to compare against: the observed snapshot simply becomes the baseline.
///
/// Returns the `ALTER TABLE ... ADD COLUMN` statements that propagate
/// accepted column additions to an existing target.
pub async fn enforce_schema_policy(
    store: &dyn Store,
    node: &ModelNode,
    baselines: &Mutex<SchemaBaselines>,
) -> EngineResult<Vec<String>> {
    let observed = SchemaSnapshot::new(store.describe(&node.select).await?);

    let mut baselines = baselines.lock().unwrap_or_else(|p| p.into_inner());

    let Some(baseline) = baselines.get(&node.name) else {
        baselines.accept(node.name.clone(), observed);
        return Ok(Vec::new());
    };

    let diff = baseline.diff(&observed);
    if diff.is_empty() {
        baselines.accept(node.name.clone(), observed);
        return Ok(Vec::new());
    }

    match node.on_schema_change {
        SchemaPolicy::Fail => Err(CoreError::SchemaDrift {
            node: node.name.to_string(),
            diff,
        }
        .into()),
        SchemaPolicy::Ignore => {
            log::warn!("ignoring schema drift on '{}': {}", node.name, diff);
            baselines.accept(node.name.clone(), observed);
            Ok(Vec::new())
        }
        SchemaPolicy::AppendNewColumns => {
            if diff.has_breaking_changes() {
                return Err(CoreError::SchemaDrift {
                    node: node.name.to_string(),
                    diff,
                }
                .into());
            }
            let ddl = diff
                .added
                .iter()
                .map(|col| {
                    format!(
                        "ALTER TABLE {} ADD COLUMN {} {}",
                        node.quoted_target(),
                        quote_ident(&col.name),
                        col.data_type
                    )
                })
                .collect();
            baselines.accept(node.name.clone(), observed);
            Ok(ddl)
        }
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
