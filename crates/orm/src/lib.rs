//! # morph-orm: Data-access layer for morphed model exporting
//!
//! Dynamic records, model schemas with relationship metadata, a morph map,
//! a query builder and the connections that execute it. This is the layer
//! `morphed-model-exporter` resolves polymorphic relations and runs its
//! batched queries through.

pub mod connection;
mod eager;
pub mod error;
pub mod model;
pub mod model_query;
pub mod query;
pub mod schema;

// Re-export core traits and types
pub use connection::{Connection, MemoryConnection, PgConnection, Row};
pub use error::*;
pub use model::{normalize_key, Loaded, Model, Record};
pub use model_query::{EagerLoad, ModelQuery};
pub use query::{OrderDirection, QueryBuilder, QueryOperator, WhereCondition};
pub use schema::{
    ModelSchema, PolymorphicConfig, RelationshipMetadata, RelationshipType, SchemaRegistry,
};
