//! Schema Registry - Runtime model schemas, relationship metadata and morph map
//!
//! The registry is built once at startup and shared behind an `Arc`. It
//! answers the questions loaders ask at runtime: which table and key a model
//! uses, what a named relationship looks like, and which model a stored
//! morph type token refers to.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{ModelError, ModelResult};
use crate::model::{Model, Record};

pub mod metadata;

pub use metadata::{PolymorphicConfig, RelationshipMetadata, RelationshipType};

/// Schema of a single model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSchema {
    name: String,
    table: String,
    primary_key: String,
    soft_deletes: bool,
    relationships: HashMap<String, RelationshipMetadata>,
}

impl ModelSchema {
    /// Create a schema for `name` stored in `table`, keyed by `id`
    pub fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            primary_key: "id".to_string(),
            soft_deletes: false,
            relationships: HashMap::new(),
        }
    }

    /// Set the primary key column
    pub fn primary_key(mut self, column: &str) -> Self {
        self.primary_key = column.to_string();
        self
    }

    /// Enable or disable soft deletes (`deleted_at IS NULL` on every query)
    pub fn soft_deletes(mut self, enabled: bool) -> Self {
        self.soft_deletes = enabled;
        self
    }

    /// Declare a relationship
    pub fn with_relationship(mut self, metadata: RelationshipMetadata) -> Self {
        self.relationships.insert(metadata.name.clone(), metadata);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key_name(&self) -> &str {
        &self.primary_key
    }

    pub fn uses_soft_deletes(&self) -> bool {
        self.soft_deletes
    }

    /// Get relationship metadata by name
    pub fn relationship(&self, name: &str) -> Option<&RelationshipMetadata> {
        self.relationships.get(name)
    }

    /// Get all relationship names
    pub fn relationship_names(&self) -> Vec<&str> {
        self.relationships.keys().map(String::as_str).collect()
    }

    /// Validate the schema and all of its relationships
    pub fn validate(&self) -> ModelResult<()> {
        if self.name.is_empty() || self.table.is_empty() {
            return Err(ModelError::Configuration(format!(
                "model '{}' must declare a name and a table",
                self.name
            )));
        }

        if self.primary_key.is_empty() {
            return Err(ModelError::MissingPrimaryKey);
        }

        for metadata in self.relationships.values() {
            metadata.validate()?;
        }

        Ok(())
    }
}

/// Registry of model schemas and the morph map
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    models: HashMap<String, ModelSchema>,
    /// morph type token -> model name
    morph_map: HashMap<String, String>,
}

impl SchemaRegistry {
    /// Create a new empty schema registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model schema, replacing any previous schema of the same name
    pub fn register(&mut self, schema: ModelSchema) -> ModelResult<()> {
        schema.validate()?;
        tracing::debug!("Registering model schema: {} ({})", schema.name, schema.table);
        self.models.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Register the schema of a typed model
    pub fn register_model<M: Model>(&mut self) -> ModelResult<()> {
        self.register(M::schema())
    }

    /// Add morph map entries (`token -> model name`)
    pub fn morph_map<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (token, model) in entries {
            self.morph_map.insert(token.into(), model.into());
        }
    }

    /// Get a model schema
    pub fn model(&self, name: &str) -> Option<&ModelSchema> {
        self.models.get(name)
    }

    /// Get a model schema or fail with a schema error
    pub fn require(&self, name: &str) -> ModelResult<&ModelSchema> {
        self.model(name)
            .ok_or_else(|| ModelError::Schema(format!("model '{}' is not registered", name)))
    }

    /// Get relationship metadata by model and relationship name
    pub fn relationship(&self, model: &str, name: &str) -> Option<&RelationshipMetadata> {
        self.model(model)?.relationship(name)
    }

    /// Resolve a stored morph type token; unmapped tokens are the model name
    pub fn resolve_morph_type<'a>(&'a self, token: &'a str) -> &'a str {
        self.morph_map.get(token).map(String::as_str).unwrap_or(token)
    }

    /// The token stored for `model` in morph type columns
    pub fn morph_alias<'a>(&'a self, model: &'a str) -> &'a str {
        self.morph_map
            .iter()
            .find(|(_, mapped)| mapped.as_str() == model)
            .map(|(token, _)| token.as_str())
            .unwrap_or(model)
    }

    /// Build a record of `model` from a fetched row
    pub fn hydrate(&self, model: &str, row: Map<String, Value>) -> ModelResult<Record> {
        let schema = self.require(model)?;
        Ok(Record::from_attributes(schema.name(), row).with_key_name(schema.primary_key_name()))
    }

    /// Names of all registered models
    pub fn model_names(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }
}
