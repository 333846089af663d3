//! Base Model System - Dynamic records and the typed Model trait
//!
//! `Record` is the untyped row representation every query returns: a model
//! name, a primary key column, an attribute map and the relations attached to
//! it so far. `Model` lets typed structs describe their schema and convert to
//! and from records.

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::error::{ModelError, ModelResult};
use crate::schema::{ModelSchema, RelationshipMetadata};

/// State of a relation attached to a record
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    /// Single related record, `None` when the reference matched no row
    One(Option<Box<Record>>),
    /// Collection of related records
    Many(Vec<Record>),
}

impl Loaded {
    /// Wrap an optional record into a to-one relation state
    pub fn one(record: Option<Record>) -> Self {
        Loaded::One(record.map(Box::new))
    }

    /// Convert the loaded relation to JSON
    pub fn to_json(&self) -> Value {
        match self {
            Loaded::One(Some(record)) => record.to_json(),
            Loaded::One(None) => Value::Null,
            Loaded::Many(records) => Value::Array(records.iter().map(Record::to_json).collect()),
        }
    }
}

/// A row of some model, with the relations attached to it
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    model: String,
    key_name: String,
    attributes: Map<String, Value>,
    relations: BTreeMap<String, Loaded>,
}

impl Record {
    /// Create an empty record of the given model
    pub fn new(model: impl Into<String>) -> Self {
        Self::from_attributes(model, Map::new())
    }

    /// Create a record from an attribute map
    pub fn from_attributes(model: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            model: model.into(),
            key_name: "id".to_string(),
            attributes,
            relations: BTreeMap::new(),
        }
    }

    /// Set the primary key column name
    pub fn with_key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = key_name.into();
        self
    }

    /// Set an attribute, builder style
    pub fn with_attribute(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// The model name this record belongs to
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The primary key column name
    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// The primary key value, if set and not null
    pub fn key(&self) -> Option<&Value> {
        self.attributes.get(&self.key_name).filter(|v| !v.is_null())
    }

    /// Get an attribute value
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    /// Set an attribute value
    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.attributes.insert(column.to_string(), value.into());
    }

    /// All attributes of this record
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Get the state of a relation, `None` if it was never attached
    pub fn relation(&self, name: &str) -> Option<&Loaded> {
        self.relations.get(name)
    }

    /// Check whether a relation has been attached
    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Get the record attached to a to-one relation
    pub fn related(&self, name: &str) -> Option<&Record> {
        match self.relations.get(name)? {
            Loaded::One(record) => record.as_deref(),
            Loaded::Many(_) => None,
        }
    }

    /// Get the records attached to a to-many relation
    pub fn related_many(&self, name: &str) -> Option<&[Record]> {
        match self.relations.get(name)? {
            Loaded::Many(records) => Some(records),
            Loaded::One(_) => None,
        }
    }

    /// Attach a relation, replacing any previous state
    pub fn set_relation(&mut self, name: &str, loaded: Loaded) {
        self.relations.insert(name.to_string(), loaded);
    }

    /// Detach a relation
    pub fn unset_relation(&mut self, name: &str) -> Option<Loaded> {
        self.relations.remove(name)
    }

    /// Names of all attached relations
    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }

    /// Attributes plus attached relations, relations nested under their name
    pub fn to_json(&self) -> Value {
        let mut object = self.attributes.clone();
        for (name, loaded) in &self.relations {
            object.insert(name.clone(), loaded.to_json());
        }
        Value::Object(object)
    }
}

/// Normalize a key value so that `1` and `"1"` index the same row
pub fn normalize_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Trait for typed models backed by a table
pub trait Model: Send + Sync + Debug + Serialize + DeserializeOwned {
    /// Model name used as the type identifier and default morph type
    fn model_name() -> &'static str;

    /// Table name for this model
    fn table_name() -> &'static str;

    /// Primary key field name
    fn primary_key_name() -> &'static str {
        "id"
    }

    /// Check if this model supports soft deletes
    fn uses_soft_deletes() -> bool {
        false
    }

    /// Relationships declared by this model
    fn relationships() -> Vec<RelationshipMetadata> {
        Vec::new()
    }

    /// Build the runtime schema for this model
    fn schema() -> ModelSchema
    where
        Self: Sized,
    {
        Self::relationships().into_iter().fold(
            ModelSchema::new(Self::model_name(), Self::table_name())
                .primary_key(Self::primary_key_name())
                .soft_deletes(Self::uses_soft_deletes()),
            ModelSchema::with_relationship,
        )
    }

    /// Create a model instance from a record's attributes
    fn from_record(record: &Record) -> ModelResult<Self>
    where
        Self: Sized,
    {
        if record.model() != Self::model_name() {
            return Err(ModelError::Serialization(format!(
                "record of model '{}' cannot be read as '{}'",
                record.model(),
                Self::model_name()
            )));
        }
        Ok(serde_json::from_value(Value::Object(record.attributes().clone()))?)
    }

    /// Convert this model instance into a record
    fn to_record(&self) -> ModelResult<Record> {
        match serde_json::to_value(self)? {
            Value::Object(attributes) => Ok(Record::from_attributes(Self::model_name(), attributes)
                .with_key_name(Self::primary_key_name())),
            _ => Err(ModelError::Serialization(format!(
                "model '{}' must serialize to an object",
                Self::model_name()
            ))),
        }
    }
}
