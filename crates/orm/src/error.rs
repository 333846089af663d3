//! Error types for the data-access layer
//!
//! Provides error handling for schema lookups, query building and
//! query execution against a backend connection.

use std::fmt;

pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised by schema lookups, query building and execution
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Backend failed to execute a query
    Database(String),
    /// Model schema is missing or inconsistent
    Schema(String),
    Relationship(String),
    Query(String),
    /// Row could not be converted to or from a typed model
    Serialization(String),
    Configuration(String),
    MissingPrimaryKey,
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Database(msg) => write!(f, "Database error: {}", msg),
            ModelError::Schema(msg) => write!(f, "Schema error: {}", msg),
            ModelError::Relationship(msg) => write!(f, "Relationship error: {}", msg),
            ModelError::Query(msg) => write!(f, "Query error: {}", msg),
            ModelError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            ModelError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            ModelError::MissingPrimaryKey => write!(f, "Primary key is missing or invalid"),
        }
    }
}

impl std::error::Error for ModelError {}

impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        ModelError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelError::Schema("model 'Todo' is not registered".to_string());
        assert_eq!(err.to_string(), "Schema error: model 'Todo' is not registered");

        assert_eq!(
            ModelError::MissingPrimaryKey.to_string(),
            "Primary key is missing or invalid"
        );
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ModelError = parse_err.into();
        assert!(matches!(err, ModelError::Serialization(_)));
    }
}
