//! Error types for tm-store

use thiserror::Error;

/// Store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection error (S001)
    #[error("[S001] Store connection failed: {0}")]
    Connection(String),

    /// Statement execution error (S002)
    #[error("[S002] SQL execution failed: {0}")]
    Execution(String),

    /// Transient condition worth retrying (S003)
    #[error("[S003] Transient store error: {0}")]
    Transient(String),

    /// Constraint violation; retrying the same statement reproduces it (S004)
    #[error("[S004] Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Relation not found (S005)
    #[error("[S005] Table or view not found: {0}")]
    RelationNotFound(String),

    /// Result decoding error (S006)
    #[error("[S006] Failed to decode result: {0}")]
    Decode(String),

    /// Connection mutex poisoned (S007)
    #[error("[S007] Store mutex poisoned")]
    Poisoned,
}

/// Result type alias for StoreError
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Worth retrying with backoff; everything else is fatal for the run.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation(_))
    }
}

impl From<duckdb::Error> for StoreError {
    fn from(err: duckdb::Error) -> Self {
        // Classify DuckDB errors by inspecting the error message.
        // duckdb::Error does not expose structured variants, so string
        // matching is the only reliable approach. We use narrow patterns
        // to avoid misclassifying function/type/schema errors.
        let msg = err.to_string();
        if msg.contains("Constraint Error") {
            StoreError::ConstraintViolation(msg)
        } else if msg.contains("IO Error")
            || msg.contains("Could not set lock")
            || msg.contains("database is locked")
            || msg.contains("TransactionContext Error")
        {
            StoreError::Transient(msg)
        } else if msg.contains("Table with name")
            || msg.contains("View with name")
            || msg.contains("Table or view with name")
            || (msg.contains("Catalog Error") && msg.contains("Table") && msg.contains("not found"))
        {
            StoreError::RelationNotFound(msg)
        } else {
            StoreError::Execution(msg)
        }
    }
}
