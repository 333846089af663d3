//! In-memory connection
//!
//! Evaluates query builders against tables held in memory and records every
//! executed query, which makes it the backend of choice for tests that assert
//! on query counts.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use super::{Connection, Row};
use crate::error::{ModelError, ModelResult};
use crate::model::normalize_key;
use crate::query::{OrderDirection, QueryBuilder, QueryOperator, WhereCondition};

/// Connection over in-memory tables
#[derive(Debug, Default)]
pub struct MemoryConnection {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    next_ids: Mutex<HashMap<String, i64>>,
    query_log: Mutex<Vec<String>>,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table; inserting also creates tables on demand
    pub fn create_table(&self, table: &str) {
        self.tables.write().entry(table.to_string()).or_default();
    }

    /// Insert a row, assigning an auto-incrementing `id` when missing
    ///
    /// Returns the row's `id`.
    pub fn insert(&self, table: &str, row: Value) -> ModelResult<Value> {
        let Value::Object(mut row) = row else {
            return Err(ModelError::Query(format!(
                "rows inserted into '{}' must be JSON objects",
                table
            )));
        };

        let mut next_ids = self.next_ids.lock();
        let next_id = next_ids.entry(table.to_string()).or_insert(1);
        let id = match row.get("id") {
            Some(Value::Number(n)) => {
                if let Some(explicit) = n.as_i64() {
                    *next_id = (*next_id).max(explicit + 1);
                }
                Value::Number(n.clone())
            }
            Some(value) if !value.is_null() => value.clone(),
            _ => {
                let id = Value::from(*next_id);
                *next_id += 1;
                row.insert("id".to_string(), id.clone());
                id
            }
        };

        self.tables.write().entry(table.to_string()).or_default().push(row);
        Ok(id)
    }

    /// Snapshot of a table's rows
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.read().get(table).cloned().unwrap_or_default()
    }

    /// Number of queries executed so far
    pub fn query_count(&self) -> usize {
        self.query_log.lock().len()
    }

    /// SQL of every executed query, in execution order
    pub fn queries(&self) -> Vec<String> {
        self.query_log.lock().clone()
    }

    /// Forget executed queries
    pub fn clear_query_log(&self) {
        self.query_log.lock().clear();
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn fetch_all(&self, query: &QueryBuilder) -> ModelResult<Vec<Row>> {
        let sql = query.to_sql();
        tracing::debug!("Executing in-memory query: {}", sql);
        self.query_log.lock().push(sql);

        let table = query
            .table()
            .ok_or_else(|| ModelError::Query("query has no FROM table".to_string()))?;

        let tables = self.tables.read();
        let rows = tables
            .get(table)
            .ok_or_else(|| ModelError::Database(format!("relation \"{}\" does not exist", table)))?;

        let mut matched: Vec<&Row> = rows
            .iter()
            .filter(|row| query.conditions().iter().all(|condition| matches(row, condition)))
            .collect();

        for clause in query.order_clauses().iter().rev() {
            matched.sort_by(|a, b| {
                let ordering = compare(column(a, &clause.column), column(b, &clause.column))
                    .unwrap_or(Ordering::Equal);
                match clause.direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                }
            });
        }

        let offset = query.offset_value().unwrap_or(0).max(0) as usize;
        let limit = query.limit_value().map(|l| l.max(0) as usize).unwrap_or(usize::MAX);

        let mut results: Vec<Row> = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| project(row, query))
            .collect();

        if query.is_distinct() {
            let mut unique: Vec<Row> = Vec::with_capacity(results.len());
            for row in results {
                if !unique.contains(&row) {
                    unique.push(row);
                }
            }
            results = unique;
        }

        Ok(results)
    }
}

fn column<'a>(row: &'a Row, name: &str) -> &'a Value {
    let name = name.rsplit('.').next().unwrap_or(name);
    row.get(name).unwrap_or(&Value::Null)
}

fn project(row: &Row, query: &QueryBuilder) -> Row {
    if query.selects_all() {
        return row.clone();
    }

    query
        .select_fields()
        .iter()
        .map(|field| {
            let name = field.rsplit('.').next().unwrap_or(field);
            (name.to_string(), column(row, name).clone())
        })
        .collect()
}

fn matches(row: &Row, condition: &WhereCondition) -> bool {
    let value = column(row, &condition.column);
    match condition.operator {
        QueryOperator::IsNull => value.is_null(),
        QueryOperator::IsNotNull => !value.is_null(),
        QueryOperator::In => condition.values.iter().any(|v| loosely_equal(value, v)),
        QueryOperator::NotIn => !condition.values.iter().any(|v| loosely_equal(value, v)),
        operator => {
            let Some(expected) = &condition.value else {
                return value.is_null();
            };
            match operator {
                QueryOperator::Equal => loosely_equal(value, expected),
                QueryOperator::NotEqual => !value.is_null() && !loosely_equal(value, expected),
                QueryOperator::GreaterThan => compare(value, expected) == Some(Ordering::Greater),
                QueryOperator::GreaterThanOrEqual => {
                    matches!(compare(value, expected), Some(Ordering::Greater | Ordering::Equal))
                }
                QueryOperator::LessThan => compare(value, expected) == Some(Ordering::Less),
                QueryOperator::LessThanOrEqual => {
                    matches!(compare(value, expected), Some(Ordering::Less | Ordering::Equal))
                }
                _ => false,
            }
        }
    }
}

// NULL never equals anything, as in SQL
fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (normalize_key(left), normalize_key(right)) {
        (Some(l), Some(r)) => l == r || compare(left, right) == Some(Ordering::Equal),
        _ => false,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        (Value::Number(n), Value::String(s)) => n.as_f64()?.partial_cmp(&s.parse::<f64>().ok()?),
        (Value::String(s), Value::Number(n)) => s.parse::<f64>().ok()?.partial_cmp(&n.as_f64()?),
        _ => None,
    }
}
