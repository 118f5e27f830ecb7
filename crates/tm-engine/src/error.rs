//! Error types for tm-engine

use thiserror::Error;
use tm_core::CoreError;
use tm_store::StoreError;

/// Engine error type wrapping core and store failures
#[derive(Error, Debug)]
pub enum EngineError {
    /// Domain-level failure: cycle, invalid window or key input, schema
    /// drift, bad configuration. Fatal for the node's run.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Store-level failure. Only transient variants are retried.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The run was cancelled before its write phase committed (X001)
    #[error("[X001] Run cancelled for node '{node}'")]
    Cancelled { node: String },
}

impl EngineError {
    /// Worth retrying with backoff after full replanning.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Store(e) if e.is_transient())
    }
}

/// Result type alias for EngineError
pub type EngineResult<T> = Result<T, EngineError>;
