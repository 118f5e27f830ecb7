//! Schema snapshots and drift comparison.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One column in an observed or stored schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.data_type)
    }
}

/// Ordered column set of a node's source extract, captured per run.
///
/// Only the most recent accepted snapshot is kept as the drift baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SchemaSnapshot {
    pub columns: Vec<Column>,
}

impl SchemaSnapshot {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Look up a column by name, case-insensitively (store identifiers
    /// fold case).
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Compare this baseline against an observed snapshot.
    ///
    /// Added columns follow observed order, removed columns baseline order.
    /// Type comparison is case-insensitive.
    pub fn diff(&self, observed: &SchemaSnapshot) -> SchemaDiff {
        let added = observed
            .columns
            .iter()
            .filter(|c| self.column(&c.name).is_none())
            .cloned()
            .collect();

        let removed = self
            .columns
            .iter()
            .filter(|c| observed.column(&c.name).is_none())
            .cloned()
            .collect();

        let retyped = self
            .columns
            .iter()
            .filter_map(|baseline| {
                let current = observed.column(&baseline.name)?;
                if baseline.data_type.eq_ignore_ascii_case(&current.data_type) {
                    None
                } else {
                    Some(RetypedColumn {
                        name: baseline.name.clone(),
                        from: baseline.data_type.clone(),
                        to: current.data_type.clone(),
                    })
                }
            })
            .collect();

        SchemaDiff {
            added,
            removed,
            retyped,
        }
    }
}

/// A column whose declared type changed between baseline and observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetypedColumn {
    pub name: String,
    pub from: String,
    pub to: String,
}

impl fmt::Display for RetypedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.name, self.from, self.to)
    }
}

/// Column-level difference between a baseline and an observed schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SchemaDiff {
    pub added: Vec<Column>,
    pub removed: Vec<Column>,
    pub retyped: Vec<RetypedColumn>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.retyped.is_empty()
    }

    /// Removed or retyped columns break downstream readers even under the
    /// append-new-columns policy.
    pub fn has_breaking_changes(&self) -> bool {
        !self.removed.is_empty() || !self.retyped.is_empty()
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.added.is_empty() {
            parts.push(format!("added: {}", join_displayable(&self.added)));
        }
        if !self.removed.is_empty() {
            parts.push(format!("removed: {}", join_displayable(&self.removed)));
        }
        if !self.retyped.is_empty() {
            parts.push(format!("retyped: {}", join_displayable(&self.retyped)));
        }
        if parts.is_empty() {
            f.write_str("no changes")
        } else {
            f.write_str(&parts.join("; "))
        }
    }
}

fn join_displayable<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(cols: &[(&str, &str)]) -> SchemaSnapshot {
        SchemaSnapshot::new(
            cols.iter()
                .map(|(n, t)| Column::new(*n, *t))
                .collect(),
        )
    }

    #[test]
    fn test_identical_schemas_have_empty_diff() {
        let a = snapshot(&[("id", "INTEGER"), ("name", "VARCHAR")]);
        let b = snapshot(&[("id", "INTEGER"), ("name", "VARCHAR")]);
        assert!(a.diff(&b).is_empty());
    }

    #[test]
    fn test_case_insensitive_comparison() {
        let a = snapshot(&[("ID", "integer")]);
        let b = snapshot(&[("id", "INTEGER")]);
        assert!(a.diff(&b).is_empty());
    }

    #[test]
    fn test_removed_column_detected() {
        let baseline = snapshot(&[("id", "INTEGER"), ("name", "VARCHAR"), ("price", "DOUBLE")]);
        let observed = snapshot(&[("id", "INTEGER"), ("name", "VARCHAR")]);

        let diff = baseline.diff(&observed);
        assert!(diff.added.is_empty());
        assert_eq!(diff.removed, vec![Column::new("price", "DOUBLE")]);
        assert!(diff.has_breaking_changes());
    }

    #[test]
    fn test_added_column_is_not_breaking() {
        let baseline = snapshot(&[("id", "INTEGER")]);
        let observed = snapshot(&[("id", "INTEGER"), ("rating", "DOUBLE")]);

        let diff = baseline.diff(&observed);
        assert_eq!(diff.added, vec![Column::new("rating", "DOUBLE")]);
        assert!(!diff.has_breaking_changes());
        assert!(!diff.is_empty());
    }

    #[test]
    fn test_retyped_column_detected() {
        let baseline = snapshot(&[("id", "INTEGER")]);
        let observed = snapshot(&[("id", "VARCHAR")]);

        let diff = baseline.diff(&observed);
        assert_eq!(diff.retyped.len(), 1);
        assert_eq!(diff.retyped[0].from, "INTEGER");
        assert_eq!(diff.retyped[0].to, "VARCHAR");
        assert!(diff.has_breaking_changes());
    }

    #[test]
    fn test_diff_display_lists_columns() {
        let baseline = snapshot(&[("id", "INTEGER"), ("price", "DOUBLE")]);
        let observed = snapshot(&[("id", "VARCHAR"), ("rating", "DOUBLE")]);

        let rendered = baseline.diff(&observed).to_string();
        assert!(rendered.contains("added: rating DOUBLE"));
        assert!(rendered.contains("removed: price DOUBLE"));
        assert!(rendered.contains("retyped: id: INTEGER -> VARCHAR"));
    }
}
