//! PostgreSQL connection backed by an sqlx pool

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row as _};

use super::{Connection, Row};
use crate::error::{ModelError, ModelResult};
use crate::query::QueryBuilder;

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: 30,
        }
    }
}

/// Read-only connection over a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgConnection {
    pool: PgPool,
}

impl PgConnection {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a pool for `database_url` with the given configuration
    pub async fn connect(database_url: &str, config: &PoolConfig) -> ModelResult<Self> {
        tracing::debug!(
            "Creating database pool with config: max={}, min={}, timeout={}s",
            config.max_connections,
            config.min_connections,
            config.acquire_timeout
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout))
            .connect(database_url)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create database pool: {}", e);
                ModelError::Database(format!("Failed to create database pool: {}", e))
            })?;

        Ok(Self::new(pool))
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn fetch_all(&self, query: &QueryBuilder) -> ModelResult<Vec<Row>> {
        let (sql, params) = query.to_sql_with_params();
        tracing::debug!("Executing query: {}", sql);

        let mut db_query = sqlx::query(&sql);
        for param in &params {
            db_query = match param {
                JsonValue::Null => db_query.bind(None::<i64>),
                JsonValue::Bool(b) => db_query.bind(*b),
                JsonValue::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        db_query.bind(i)
                    } else if let Some(f) = n.as_f64() {
                        db_query.bind(f)
                    } else {
                        return Err(ModelError::Query("Invalid number type".into()));
                    }
                }
                JsonValue::String(s) => match as_uuid(s) {
                    Some(id) => db_query.bind(id),
                    None => db_query.bind(s.clone()),
                },
                _ => return Err(ModelError::Query("Unsupported parameter type".into())),
            };
        }

        let rows = db_query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ModelError::Database(format!("Query failed: {}", e)))?;

        Ok(rows.iter().map(row_to_json).collect())
    }
}

/// Hyphenated uuid strings, as `row_to_json` renders uuid columns
fn as_uuid(value: &str) -> Option<uuid::Uuid> {
    if value.len() != 36 {
        return None;
    }
    uuid::Uuid::parse_str(value).ok()
}

/// Convert a PostgreSQL row to a JSON object
fn row_to_json(row: &PgRow) -> Row {
    let mut map = Row::new();

    for (i, column) in row.columns().iter().enumerate() {
        let json_value = if let Ok(value) = row.try_get::<Option<i64>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()))
        } else if let Ok(value) = row.try_get::<Option<i32>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()))
        } else if let Ok(value) = row.try_get::<Option<String>, _>(i) {
            value.map_or(JsonValue::Null, JsonValue::String)
        } else if let Ok(value) = row.try_get::<Option<f64>, _>(i) {
            value
                .and_then(serde_json::Number::from_f64)
                .map_or(JsonValue::Null, JsonValue::Number)
        } else if let Ok(value) = row.try_get::<Option<bool>, _>(i) {
            value.map_or(JsonValue::Null, JsonValue::Bool)
        } else if let Ok(value) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::String(v.to_rfc3339()))
        } else if let Ok(value) = row.try_get::<Option<chrono::NaiveDateTime>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::String(v.to_string()))
        } else if let Ok(value) = row.try_get::<Option<uuid::Uuid>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::String(v.to_string()))
        } else if let Ok(value) = row.try_get::<Option<JsonValue>, _>(i) {
            value.unwrap_or(JsonValue::Null)
        } else {
            JsonValue::Null
        };

        map.insert(column.name().to_string(), json_value);
    }

    map
}
