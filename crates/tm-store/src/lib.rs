//! tm-store - Store abstraction layer for Tidemark
//!
//! Defines the [`Store`] contract the engine executes against and provides
//! the DuckDB backend. Every write call is transactional at its own
//! granularity; the engine's atomicity guarantees depend on that.

pub mod duckdb;
pub mod error;
pub mod traits;

pub use duckdb::DuckDbStore;
pub use error::{StoreError, StoreResult};
pub use traits::Store;
