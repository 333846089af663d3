//! Query Builder - Fluent builder for the read queries loaders issue
//!
//! Produces either inline SQL (`to_sql`, used for logging and query logs) or
//! parameterized SQL with `$n` placeholders (`to_sql_with_params`, used for
//! execution). Backends that do not speak SQL read the clauses directly.

use serde_json::Value;

/// Comparison operators supported in WHERE clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl QueryOperator {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }
}

/// One condition of the WHERE clause; conditions are joined with AND
#[derive(Debug, Clone, PartialEq)]
pub struct WhereCondition {
    pub column: String,
    pub operator: QueryOperator,
    /// Operand of binary comparisons
    pub value: Option<Value>,
    /// Operand set of `IN` / `NOT IN`
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByClause {
    pub column: String,
    pub direction: OrderDirection,
}

/// Builder for single-table read queries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    table: Option<String>,
    columns: Vec<String>,
    conditions: Vec<WhereCondition>,
    ordering: Vec<OrderByClause>,
    limit: Option<i64>,
    offset: Option<i64>,
    distinct: bool,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append comma separated columns to the projection
    pub fn select(mut self, columns: &str) -> Self {
        self.columns.extend(
            columns
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        );
        self
    }

    /// Replace the projection
    pub fn select_only<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn select_distinct(mut self, columns: &str) -> Self {
        self.distinct = true;
        self.select(columns)
    }

    pub fn from(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    fn condition(
        mut self,
        column: &str,
        operator: QueryOperator,
        value: Option<Value>,
        values: Vec<Value>,
    ) -> Self {
        self.conditions.push(WhereCondition {
            column: column.to_string(),
            operator,
            value,
            values,
        });
        self
    }

    fn compare<T: Into<Value>>(self, column: &str, operator: QueryOperator, value: T) -> Self {
        self.condition(column, operator, Some(value.into()), Vec::new())
    }

    pub fn where_eq<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(column, QueryOperator::Equal, value)
    }

    pub fn where_ne<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(column, QueryOperator::NotEqual, value)
    }

    pub fn where_gt<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(column, QueryOperator::GreaterThan, value)
    }

    pub fn where_gte<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(column, QueryOperator::GreaterThanOrEqual, value)
    }

    pub fn where_lt<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(column, QueryOperator::LessThan, value)
    }

    pub fn where_lte<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(column, QueryOperator::LessThanOrEqual, value)
    }

    /// Membership test; an empty set matches no row
    pub fn where_in<T: Into<Value>>(self, column: &str, values: Vec<T>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.condition(column, QueryOperator::In, None, values)
    }

    /// Negated membership test; an empty set matches every row
    pub fn where_not_in<T: Into<Value>>(self, column: &str, values: Vec<T>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.condition(column, QueryOperator::NotIn, None, values)
    }

    pub fn where_null(self, column: &str) -> Self {
        self.condition(column, QueryOperator::IsNull, None, Vec::new())
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.condition(column, QueryOperator::IsNotNull, None, Vec::new())
    }

    fn push_order(mut self, column: &str, direction: OrderDirection) -> Self {
        self.ordering.push(OrderByClause {
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn order_by(self, column: &str) -> Self {
        self.push_order(column, OrderDirection::Asc)
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.push_order(column, OrderDirection::Desc)
    }

    pub fn limit(mut self, count: i64) -> Self {
        self.limit = Some(count);
        self
    }

    pub fn offset(mut self, count: i64) -> Self {
        self.offset = Some(count);
        self
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn select_fields(&self) -> &[String] {
        &self.columns
    }

    pub fn conditions(&self) -> &[WhereCondition] {
        &self.conditions
    }

    pub fn order_clauses(&self) -> &[OrderByClause] {
        &self.ordering
    }

    pub fn limit_value(&self) -> Option<i64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<i64> {
        self.offset
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// True when no explicit projection is set
    pub fn selects_all(&self) -> bool {
        self.columns.is_empty() || self.columns.iter().any(|c| c == "*")
    }

    /// SQL with values inlined as literals, for logs
    pub fn to_sql(&self) -> String {
        self.render(&mut sql_literal)
    }

    /// SQL with `$n` placeholders plus the values to bind, in order
    pub fn to_sql_with_params(&self) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = self.render(&mut |value| {
            params.push(value.clone());
            format!("${}", params.len())
        });
        (sql, params)
    }

    fn render(&self, bind: &mut dyn FnMut(&Value) -> String) -> String {
        let projection = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };

        let mut parts = vec![
            (if self.distinct { "SELECT DISTINCT" } else { "SELECT" }).to_string(),
            projection,
        ];

        if let Some(table) = &self.table {
            parts.push(format!("FROM {}", table));
        }

        if !self.conditions.is_empty() {
            let predicate = self
                .conditions
                .iter()
                .map(|c| render_condition(c, bind))
                .collect::<Vec<_>>()
                .join(" AND ");
            parts.push(format!("WHERE {}", predicate));
        }

        if !self.ordering.is_empty() {
            let ordering = self
                .ordering
                .iter()
                .map(|o| format!("{} {}", o.column, o.direction.as_sql()))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("ORDER BY {}", ordering));
        }

        if let Some(limit) = self.limit {
            parts.push(format!("LIMIT {}", limit));
        }

        if let Some(offset) = self.offset {
            parts.push(format!("OFFSET {}", offset));
        }

        parts.join(" ")
    }
}

fn render_condition(condition: &WhereCondition, bind: &mut dyn FnMut(&Value) -> String) -> String {
    let column = &condition.column;
    let operator = condition.operator.as_sql();

    match condition.operator {
        QueryOperator::IsNull | QueryOperator::IsNotNull => format!("{} {}", column, operator),
        QueryOperator::In if condition.values.is_empty() => "1 = 0".to_string(),
        QueryOperator::NotIn if condition.values.is_empty() => "1 = 1".to_string(),
        QueryOperator::In | QueryOperator::NotIn => {
            let set: Vec<String> = condition.values.iter().map(|v| bind(v)).collect();
            format!("{} {} ({})", column, operator, set.join(", "))
        }
        _ => match &condition.value {
            Some(value) => format!("{} {} {}", column, operator, bind(value)),
            None => format!("{} IS NULL", column),
        },
    }
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => quote(text),
        other => quote(&other.to_string()),
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}
