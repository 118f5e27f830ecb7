//! Configuration types and parsing for tidemark.yml

use crate::error::{CoreError, CoreResult};
use crate::node::ModelNode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Main project configuration from tidemark.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,

    /// Directories containing node definition files
    #[serde(default = "default_node_paths")]
    pub node_paths: Vec<String>,

    /// Output directory for state files and run results
    #[serde(default = "default_target_path")]
    pub target_path: String,

    /// Backing store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Maximum concurrently executing nodes in a graph run
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Retry behavior for transient store failures
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Backing store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Database file path, or ":memory:" for an ephemeral store
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Retry behavior for transient store failures
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempt ceiling per node run (first attempt included)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff before the second attempt, in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Backoff ceiling, in milliseconds
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_node_paths() -> Vec<String> {
    vec!["nodes".to_string()]
}

fn default_target_path() -> String {
    "target".to_string()
}

fn default_store_path() -> String {
    ":memory:".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    250
}

fn default_backoff_cap_ms() -> u64 {
    5000
}

impl ProjectConfig {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: ProjectConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory
    /// Looks for tidemark.yml or tidemark.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("tidemark.yml");
        let yaml_path = dir.join("tidemark.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Validate the configuration
    fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "Project name cannot be empty".to_string(),
            });
        }
        if self.workers == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "'workers' must be at least 1".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "'retry.max_attempts' must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Resolved store path; relative paths are anchored at the project root
    pub fn store_path(&self, project_root: &Path) -> String {
        if self.store.path == ":memory:" || Path::new(&self.store.path).is_absolute() {
            self.store.path.clone()
        } else {
            project_root
                .join(&self.store.path)
                .display()
                .to_string()
        }
    }

    /// Path of the schema baseline state file
    pub fn baselines_path(&self, project_root: &Path) -> PathBuf {
        project_root
            .join(&self.target_path)
            .join("schema_baselines.json")
    }

    /// Path of the run results file
    pub fn run_results_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.target_path).join("run_results.json")
    }
}

/// One node definition file: any YAML file with a `nodes:` list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeFile {
    pub nodes: Vec<ModelNode>,
}

impl NodeFile {
    /// Load a node definition file
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let file: NodeFile = serde_yaml::from_str(&content)?;
        Ok(file)
    }
}

/// Discover node definitions from the configured node paths.
///
/// Scans each directory for `.yml`/`.yaml` files, validates every node,
/// and rejects duplicate names across files.
pub fn discover_nodes(project_root: &Path, node_paths: &[String]) -> CoreResult<Vec<ModelNode>> {
    let mut nodes = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for node_path in node_paths {
        let dir = project_root.join(node_path);
        if !dir.exists() {
            log::warn!("node path does not exist: {}", dir.display());
            continue;
        }

        let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .is_some_and(|ext| ext == "yml" || ext == "yaml")
            })
            .collect();
        // Deterministic load order regardless of directory iteration order
        entries.sort();

        for path in entries {
            let file = NodeFile::load(&path)?;
            for node in file.nodes {
                node.validate()?;
                if !seen.insert(node.name.to_string()) {
                    return Err(CoreError::DuplicateNode {
                        name: node.name.to_string(),
                    });
                }
                nodes.push(node);
            }
        }
    }

    Ok(nodes)
}
