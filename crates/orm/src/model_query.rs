//! Model Query - A query bound to one model, with eager loads
//!
//! `ModelQuery` is the handle customization callbacks receive: it wraps a
//! `QueryBuilder` already scoped to the model's table (and to non-deleted
//! rows for soft-deleting models) and records which relations to eager load
//! onto the fetched records.

use std::collections::HashMap;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::connection::Connection;
use crate::eager;
use crate::error::ModelResult;
use crate::model::{normalize_key, Record};
use crate::query::QueryBuilder;
use crate::schema::{ModelSchema, SchemaRegistry};

/// A relation path to eager load, with an optional column projection
#[derive(Debug, Clone, PartialEq)]
pub struct EagerLoad {
    /// Relation path, segments separated by `.`
    pub path: String,
    /// Columns to select on the last segment, empty for all
    pub columns: Vec<String>,
}

impl EagerLoad {
    /// Parse `relation` or `relation:col_a,col_b`
    pub fn parse(spec: &str) -> Self {
        match spec.split_once(':') {
            Some((path, columns)) => Self {
                path: path.trim().to_string(),
                columns: columns
                    .split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect(),
            },
            None => Self {
                path: spec.trim().to_string(),
                columns: Vec::new(),
            },
        }
    }
}

/// Query bound to a model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelQuery {
    model: String,
    key_name: String,
    builder: QueryBuilder,
    eager: Vec<EagerLoad>,
}

impl ModelQuery {
    /// Start a query over every live row of the model
    pub fn new(schema: &ModelSchema) -> Self {
        let builder = QueryBuilder::new().from(schema.table());

        // Exclude soft-deleted records by default
        let builder = if schema.uses_soft_deletes() {
            builder.where_null("deleted_at")
        } else {
            builder
        };

        Self {
            model: schema.name().to_string(),
            key_name: schema.primary_key_name().to_string(),
            builder,
            eager: Vec::new(),
        }
    }

    /// Start a query for a registered model
    pub fn for_model(schema: &SchemaRegistry, model: &str) -> ModelResult<Self> {
        Ok(Self::new(schema.require(model)?))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    pub fn eager_loads(&self) -> &[EagerLoad] {
        &self.eager
    }

    /// Apply an arbitrary transformation to the underlying builder
    pub fn apply(&mut self, f: impl FnOnce(QueryBuilder) -> QueryBuilder) -> &mut Self {
        self.builder = f(std::mem::take(&mut self.builder));
        self
    }

    /// Restrict to rows whose primary key is in `keys`
    pub fn where_key_in<T: Into<Value>>(&mut self, keys: Vec<T>) -> &mut Self {
        let key_name = self.key_name.clone();
        self.apply(|b| b.where_in(&key_name, keys))
    }

    /// Replace the column projection
    pub fn select(&mut self, columns: &[&str]) -> &mut Self {
        self.apply(|b| b.select_only(columns))
    }

    /// Eager load a relation; accepts `relation`, `a.b` and `relation:col_a,col_b`
    pub fn with(&mut self, relation: &str) -> &mut Self {
        self.eager.push(EagerLoad::parse(relation));
        self
    }

    /// Eager load a relation selecting only `columns` on it
    pub fn with_columns(&mut self, relation: &str, columns: &[&str]) -> &mut Self {
        self.eager.push(EagerLoad {
            path: relation.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn where_eq<T: Into<Value>>(&mut self, column: &str, value: T) -> &mut Self {
        self.apply(|b| b.where_eq(column, value))
    }

    pub fn where_in<T: Into<Value>>(&mut self, column: &str, values: Vec<T>) -> &mut Self {
        self.apply(|b| b.where_in(column, values))
    }

    pub fn where_null(&mut self, column: &str) -> &mut Self {
        self.apply(|b| b.where_null(column))
    }

    pub fn where_not_null(&mut self, column: &str) -> &mut Self {
        self.apply(|b| b.where_not_null(column))
    }

    pub fn order_by(&mut self, column: &str) -> &mut Self {
        self.apply(|b| b.order_by(column))
    }

    pub fn order_by_desc(&mut self, column: &str) -> &mut Self {
        self.apply(|b| b.order_by_desc(column))
    }

    pub fn limit(&mut self, count: i64) -> &mut Self {
        self.apply(|b| b.limit(count))
    }

    /// SQL of the base query, eager loads excluded
    pub fn to_sql(&self) -> String {
        self.builder.to_sql()
    }

    /// Execute the query, hydrate records and eager load requested relations
    pub fn get<'a>(
        &'a self,
        conn: &'a dyn Connection,
        schema: &'a SchemaRegistry,
    ) -> BoxFuture<'a, ModelResult<Vec<Record>>> {
        Box::pin(async move {
            let rows = conn.fetch_all(&self.builder).await?;
            let mut records: Vec<Record> = rows
                .into_iter()
                .map(|row| Record::from_attributes(&self.model, row).with_key_name(&self.key_name))
                .collect();

            if !records.is_empty() && !self.eager.is_empty() {
                eager::load_relations(&mut records, &self.eager, conn, schema).await?;
            }

            Ok(records)
        })
    }

    /// Execute the query and index the records by primary key
    pub async fn get_keyed(
        &self,
        conn: &dyn Connection,
        schema: &SchemaRegistry,
    ) -> ModelResult<HashMap<String, Record>> {
        let records = self.get(conn, schema).await?;
        Ok(records
            .into_iter()
            .filter_map(|record| {
                let key = record.key().and_then(normalize_key)?;
                Some((key, record))
            })
            .collect())
    }
}
