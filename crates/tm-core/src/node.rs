//! Node definitions: the declarative description of one materialized relation.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::node_name::NodeName;
use crate::sql::quote_qualified;

/// Materialization mode for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Materialization {
    /// No physical materialization; the node exists only in the execution trace
    #[default]
    View,
    /// Full rebuild: replace the entire target atomically
    Table,
    /// Incremental: append only rows inside the resolved partition window
    Incremental,
    /// Type-2 history tracking of the source extract
    Snapshot,
}

impl Materialization {
    /// Returns true if this mode appends within partition windows
    pub fn is_incremental(&self) -> bool {
        matches!(self, Materialization::Incremental)
    }

    /// Returns true if this mode maintains Type-2 history
    pub fn is_snapshot(&self) -> bool {
        matches!(self, Materialization::Snapshot)
    }
}

/// Schema change handling when the observed source columns drift from the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPolicy {
    /// Accept any drift and refresh the baseline (default)
    #[default]
    Ignore,
    /// Abort the node run on any added, removed, or retyped column
    Fail,
    /// Accept and propagate added columns; removed or retyped columns still abort
    AppendNewColumns,
}

/// Conflict handling when an incoming row's surrogate key already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Leave the existing row unchanged (default)
    #[default]
    NoOp,
    /// Replace the existing row with the incoming payload
    Update,
}

/// Declarative description of one node in the transformation graph.
///
/// Immutable once loaded for a run; the dependency graph owns the full set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelNode {
    /// Node name; also the default target relation name
    pub name: NodeName,

    /// Upstream node names this node reads from
    #[serde(default)]
    pub depends_on: Vec<NodeName>,

    /// Materialization mode
    #[serde(default)]
    pub materialized: Materialization,

    /// Relational body executed through the store to produce this node's rows
    pub select: String,

    /// Target schema; unqualified names land in the store's default schema
    #[serde(default)]
    pub schema: Option<String>,

    /// Ordered business-key column list used for surrogate keys
    #[serde(default)]
    pub unique_key: Vec<String>,

    /// Ordering column that bounds incremental windows
    #[serde(default)]
    pub incremental_column: Option<String>,

    /// Schema change handling
    #[serde(default)]
    pub on_schema_change: SchemaPolicy,

    /// Conflict handling for rows whose surrogate key already exists
    #[serde(default)]
    pub on_conflict: ConflictPolicy,

    /// Attribute columns whose changes open a new history record (snapshot mode)
    #[serde(default)]
    pub tracked_columns: Vec<String>,

    /// Close open history records whose key is absent from the extract
    #[serde(default)]
    pub close_deleted: bool,

    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,

    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ModelNode {
    /// Schema-qualified, unquoted target relation name.
    pub fn target_relation(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.to_string(),
        }
    }

    /// Target relation name quoted for use in generated statements.
    pub fn quoted_target(&self) -> String {
        quote_qualified(&self.target_relation())
    }

    /// Check the definition for internal consistency.
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.as_str().is_empty() {
            return Err(CoreError::InvalidNode {
                name: "<unnamed>".to_string(),
                reason: "node name must not be empty".to_string(),
            });
        }
        if self.select.trim().is_empty() {
            return Err(self.invalid("'select' must not be empty"));
        }
        match self.materialized {
            Materialization::Incremental => {
                if self.unique_key.is_empty() {
                    return Err(self.invalid("incremental nodes require 'unique_key'"));
                }
                if self.incremental_column.is_none() {
                    return Err(self.invalid("incremental nodes require 'incremental_column'"));
                }
            }
            Materialization::Snapshot => {
                if self.unique_key.is_empty() {
                    return Err(self.invalid("snapshot nodes require 'unique_key'"));
                }
                if self.tracked_columns.is_empty() {
                    return Err(self.invalid("snapshot nodes require 'tracked_columns'"));
                }
            }
            Materialization::View | Materialization::Table => {}
        }
        if self.close_deleted && !self.materialized.is_snapshot() {
            return Err(self.invalid("'close_deleted' only applies to snapshot nodes"));
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> CoreError {
        CoreError::InvalidNode {
            name: self.name.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for Materialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Materialization::View => write!(f, "view"),
            Materialization::Table => write!(f, "table"),
            Materialization::Incremental => write!(f, "incremental"),
            Materialization::Snapshot => write!(f, "snapshot"),
        }
    }
}

impl std::fmt::Display for SchemaPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaPolicy::Ignore => write!(f, "ignore"),
            SchemaPolicy::Fail => write!(f, "fail"),
            SchemaPolicy::AppendNewColumns => write!(f, "append_new_columns"),
        }
    }
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictPolicy::NoOp => write!(f, "no_op"),
            ConflictPolicy::Update => write!(f, "update"),
        }
    }
}
