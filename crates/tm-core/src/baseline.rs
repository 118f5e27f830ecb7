//! Persisted schema baselines for drift detection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::node_name::NodeName;
use crate::schema::SchemaSnapshot;

/// Baseline file holding the last accepted schema snapshot per node.
///
/// A node with no entry is on its first-ever run: its observed snapshot
/// becomes the baseline without comparison. A drift abort leaves the file
/// untouched so the next run re-detects the same drift.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchemaBaselines {
    /// When this file was last updated
    pub updated_at: DateTime<Utc>,

    /// Last accepted snapshot per node
    pub nodes: HashMap<NodeName, SchemaSnapshot>,
}

impl SchemaBaselines {
    /// Create a new empty baseline set
    pub fn new() -> Self {
        Self {
            updated_at: Utc::now(),
            nodes: HashMap::new(),
        }
    }

    /// Load baselines from a file path; a missing file is an empty set
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let baselines: SchemaBaselines = serde_json::from_str(&content)?;
        Ok(baselines)
    }

    /// Save baselines to a file path atomically
    ///
    /// Uses write-to-temp-then-rename to prevent corruption. The temp file
    /// includes the PID to avoid races from concurrent processes.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::IoWithPath {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let temp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&temp_path, &json).map_err(|e| CoreError::IoWithPath {
            path: temp_path.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&temp_path, path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            CoreError::IoWithPath {
                path: path.display().to_string(),
                source: e,
            }
        })?;
        Ok(())
    }

    /// Get the stored baseline for a node
    pub fn get(&self, node: &str) -> Option<&SchemaSnapshot> {
        self.nodes.get(node)
    }

    /// Record an accepted snapshot as the new baseline
    pub fn accept(&mut self, node: NodeName, snapshot: SchemaSnapshot) {
        self.nodes.insert(node, snapshot);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;
    use tempfile::tempdir;

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot::new(vec![
            Column::new("id", "INTEGER"),
            Column::new("name", "VARCHAR"),
        ])
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let loaded = SchemaBaselines::load(&dir.path().join("nope.json")).unwrap();
        assert!(loaded.nodes.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("target").join("schema_baselines.json");

        let mut baselines = SchemaBaselines::new();
        baselines.accept(NodeName::new("reviews"), snapshot());
        baselines.save(&path).unwrap();

        let loaded = SchemaBaselines::load(&path).unwrap();
        assert_eq!(loaded.get("reviews"), Some(&snapshot()));
        assert_eq!(loaded.get("other"), None);
    }

    #[test]
    fn test_save_replaces_previous_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schema_baselines.json");

        let mut baselines = SchemaBaselines::new();
        baselines.accept(NodeName::new("reviews"), snapshot());
        baselines.save(&path).unwrap();

        baselines.accept(
            NodeName::new("reviews"),
            SchemaSnapshot::new(vec![Column::new("id", "INTEGER")]),
        );
        baselines.save(&path).unwrap();

        let loaded = SchemaBaselines::load(&path).unwrap();
        assert_eq!(loaded.get("reviews").unwrap().columns.len(), 1);
        // No temp file left behind
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
