//! Error types for tm-core

use thiserror::Error;

use crate::schema::SchemaDiff;

/// Core error type for Tidemark
#[derive(Error, Debug)]
pub enum CoreError {
    /// E001: Configuration file not found
    #[error("[E001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// E002: Invalid configuration value
    #[error("[E002] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// E003: Node definition references an unknown node
    #[error("[E003] Node '{node}' depends on unknown node '{upstream}'")]
    UnknownUpstream { node: String, upstream: String },

    /// E004: Node not found
    #[error("[E004] Node not found: {name}")]
    NodeNotFound { name: String },

    /// E005: Duplicate node name
    #[error("[E005] Duplicate node name: {name}")]
    DuplicateNode { name: String },

    /// E006: Invalid node definition
    #[error("[E006] Invalid node '{name}': {reason}")]
    InvalidNode { name: String, reason: String },

    /// E007: Circular dependency detected
    #[error("[E007] Circular dependency detected: {cycle}")]
    Cycle { cycle: String },

    /// E008: Invalid selector
    #[error("[E008] Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// E009: Malformed surrogate-key input
    #[error("[E009] Invalid key input for node '{node}': {reason}")]
    InvalidKeyInput { node: String, reason: String },

    /// E010: Unusable partition window
    #[error("[E010] Invalid partition window: {reason}")]
    InvalidWindow { reason: String },

    /// E011: Upstream schema drifted from the stored baseline
    #[error("[E011] Schema drift on node '{node}': {diff}")]
    SchemaDrift { node: String, diff: SchemaDiff },

    /// E012: IO error
    #[error("[E012] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// E013: IO error with file path context
    #[error("[E013] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// E014: YAML parse error
    #[error("[E014] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
