//! Store abstraction consumed by the engine.

use async_trait::async_trait;
use tm_core::schema::Column;
use tm_core::value::Rows;

use crate::error::StoreResult;

/// The contract between the engine and a backing store.
///
/// Every write call is transactional at its own granularity: a statement
/// either fully applies or leaves the store unchanged, and a batch applies
/// as one transaction. The engine's atomic-replace and cancellation
/// guarantees ride on that.
#[async_trait]
pub trait Store: Send + Sync {
    /// Execute a query and return its rows.
    async fn read(&self, sql: &str) -> StoreResult<Rows>;

    /// Execute a single mutating statement; returns affected row count.
    async fn atomic_write(&self, sql: &str) -> StoreResult<usize>;

    /// Execute several statements as one transaction. On any failure the
    /// whole batch rolls back.
    async fn atomic_write_batch(&self, statements: &[String]) -> StoreResult<()>;

    /// Column names and types a query would produce, without running it.
    async fn describe(&self, select: &str) -> StoreResult<Vec<Column>>;

    /// Whether a (possibly schema-qualified) table or view exists.
    async fn relation_exists(&self, name: &str) -> StoreResult<bool>;

    /// Row count of a relation.
    async fn row_count(&self, relation: &str) -> StoreResult<usize>;

    /// Backend identifier for diagnostics.
    fn store_type(&self) -> &'static str;
}
