//! Connections - Backends that execute read queries
//!
//! A connection only has to turn a `QueryBuilder` into rows of JSON values.
//! Hydration into records, key indexing and eager loading live above it in
//! `ModelQuery`, so every backend gets them for free.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ModelResult;
use crate::query::QueryBuilder;

pub mod memory;
pub mod postgres;

pub use memory::MemoryConnection;
pub use postgres::PgConnection;

/// A fetched row, column name to value
pub type Row = Map<String, Value>;

/// Backend capable of executing read queries
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute the query and return every matching row
    async fn fetch_all(&self, query: &QueryBuilder) -> ModelResult<Vec<Row>>;
}
