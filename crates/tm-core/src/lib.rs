//! tm-core - Core library for Tidemark
//!
//! This crate provides the domain types of the materialization engine:
//! node definitions, the dependency graph, partition window resolution,
//! surrogate key generation, schema snapshots with drift comparison, and
//! project configuration parsing. It has no store or async dependencies.

pub mod baseline;
pub mod config;
pub mod dag;
pub mod error;
pub mod key;
pub mod node;
pub mod node_name;
pub mod schema;
pub mod sql;
pub mod value;
pub mod window;

pub use baseline::SchemaBaselines;
pub use config::{discover_nodes, NodeFile, ProjectConfig, RetryConfig, StoreConfig};
pub use dag::DependencyGraph;
pub use error::{CoreError, CoreResult};
pub use key::{attribute_hash, KeyGenerator, SurrogateKey};
pub use node::{ConflictPolicy, Materialization, ModelNode, SchemaPolicy};
pub use node_name::NodeName;
pub use schema::{Column, RetypedColumn, SchemaDiff, SchemaSnapshot};
pub use value::{RowRef, Rows, Value};
pub use window::{resolve_window, PartitionWindow, WindowResolution, WindowSource};
