//! Relationship Metadata - Core metadata definitions for relationships

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Kind of association between two models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    HasOne,
    HasMany,
    /// Foreign key lives on this model
    BelongsTo,
    MorphOne,
    MorphMany,
    /// Owner side of a polymorphic association: stores `(type, id)`
    MorphTo,
}

impl RelationshipType {
    pub fn is_polymorphic(self) -> bool {
        matches!(self, Self::MorphOne | Self::MorphMany | Self::MorphTo)
    }

    /// Loads into `Loaded::Many`
    pub fn is_collection(self) -> bool {
        matches!(self, Self::HasMany | Self::MorphMany)
    }
}

/// Relationship metadata containing everything needed to load it
///
/// Key semantics per relationship type:
///
/// | type | `foreign_key` | `local_key` |
/// |---|---|---|
/// | `BelongsTo` | column on this model | key column on the related model |
/// | `HasOne`, `HasMany` | column on the related model | key column on this model |
/// | `MorphOne`, `MorphMany` | morph id column on the related model | key column on this model |
/// | `MorphTo` | morph id column on this model | unused |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipMetadata {
    pub relationship_type: RelationshipType,

    /// Name of the relationship
    pub name: String,

    /// The related model's name, `None` for morph-to relationships
    pub related_model: Option<String>,

    /// Foreign key column
    pub foreign_key: String,

    /// Local key column
    pub local_key: String,

    /// Morph columns, required for polymorphic kinds
    pub polymorphic_config: Option<PolymorphicConfig>,
}

impl RelationshipMetadata {
    fn new(
        relationship_type: RelationshipType,
        name: &str,
        related_model: Option<&str>,
        foreign_key: &str,
    ) -> Self {
        Self {
            relationship_type,
            name: name.to_string(),
            related_model: related_model.map(str::to_string),
            foreign_key: foreign_key.to_string(),
            local_key: "id".to_string(),
            polymorphic_config: None,
        }
    }

    /// Declare a belongs-to relationship
    pub fn belongs_to(name: &str, related_model: &str, foreign_key: &str) -> Self {
        Self::new(RelationshipType::BelongsTo, name, Some(related_model), foreign_key)
    }

    /// Declare a has-one relationship
    pub fn has_one(name: &str, related_model: &str, foreign_key: &str) -> Self {
        Self::new(RelationshipType::HasOne, name, Some(related_model), foreign_key)
    }

    /// Declare a has-many relationship
    pub fn has_many(name: &str, related_model: &str, foreign_key: &str) -> Self {
        Self::new(RelationshipType::HasMany, name, Some(related_model), foreign_key)
    }

    /// Declare a morph-to relationship using `{name}_type` and `{name}_id` columns
    pub fn morph_to(name: &str) -> Self {
        let config = PolymorphicConfig::conventional(name);
        Self::new(RelationshipType::MorphTo, name, None, &config.id_column).with_polymorphic(config)
    }

    /// Declare a morph-one relationship pointing at `related_model` through `morph_name`
    pub fn morph_one(name: &str, related_model: &str, morph_name: &str) -> Self {
        let config = PolymorphicConfig::conventional(morph_name);
        Self::new(RelationshipType::MorphOne, name, Some(related_model), &config.id_column)
            .with_polymorphic(config)
    }

    /// Declare a morph-many relationship pointing at `related_model` through `morph_name`
    pub fn morph_many(name: &str, related_model: &str, morph_name: &str) -> Self {
        let config = PolymorphicConfig::conventional(morph_name);
        Self::new(RelationshipType::MorphMany, name, Some(related_model), &config.id_column)
            .with_polymorphic(config)
    }

    /// Set the local key
    pub fn with_local_key(mut self, local_key: &str) -> Self {
        self.local_key = local_key.to_string();
        self
    }

    /// Set polymorphic configuration, keeping the foreign key in sync with its id column
    pub fn with_polymorphic(mut self, polymorphic_config: PolymorphicConfig) -> Self {
        self.foreign_key = polymorphic_config.id_column.clone();
        self.polymorphic_config = Some(polymorphic_config);
        self
    }

    /// The related model, or a relationship error for morph-to relationships
    pub fn related(&self) -> ModelResult<&str> {
        self.related_model.as_deref().ok_or_else(|| {
            ModelError::Relationship(format!(
                "relationship '{}' has no single related model",
                self.name
            ))
        })
    }

    /// The polymorphic configuration, or a relationship error
    pub fn polymorphic(&self) -> ModelResult<&PolymorphicConfig> {
        self.polymorphic_config.as_ref().ok_or_else(|| {
            ModelError::Relationship(format!(
                "relationship '{}' is not polymorphic",
                self.name
            ))
        })
    }

    /// Polymorphic kinds need morph columns; keys must be named
    pub fn validate(&self) -> ModelResult<()> {
        if self.name.is_empty() {
            return Err(ModelError::Configuration(
                "Relationship name cannot be empty".to_string(),
            ));
        }

        if self.relationship_type.is_polymorphic() && self.polymorphic_config.is_none() {
            return Err(ModelError::Configuration(format!(
                "Relationship '{}' of type {:?} requires polymorphic configuration",
                self.name, self.relationship_type
            )));
        }

        if self.relationship_type != RelationshipType::MorphTo && self.related_model.is_none() {
            return Err(ModelError::Configuration(format!(
                "Relationship '{}' of type {:?} requires a related model",
                self.name, self.relationship_type
            )));
        }

        if self.foreign_key.is_empty() || self.local_key.is_empty() {
            return Err(ModelError::Configuration(format!(
                "Relationship '{}' must declare its key columns",
                self.name
            )));
        }

        if let Some(ref poly) = self.polymorphic_config {
            poly.validate()?;
        }

        Ok(())
    }
}

/// Columns backing a polymorphic association
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolymorphicConfig {
    /// Morph name, `todoable` for `todoable_type` / `todoable_id`
    pub name: String,

    /// Stores the morph type token
    pub type_column: String,

    /// Stores the target's primary key
    pub id_column: String,
}

impl PolymorphicConfig {
    pub fn new(name: &str, type_column: &str, id_column: &str) -> Self {
        Self {
            name: name.to_string(),
            type_column: type_column.to_string(),
            id_column: id_column.to_string(),
        }
    }

    /// `{name}_type` / `{name}_id` columns
    pub fn conventional(name: &str) -> Self {
        Self::new(name, &format!("{}_type", name), &format!("{}_id", name))
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.name.is_empty() {
            return Err(ModelError::Configuration(
                "Polymorphic relationship name cannot be empty".to_string(),
            ));
        }

        if self.type_column.is_empty() {
            return Err(ModelError::Configuration(
                "Polymorphic type column cannot be empty".to_string(),
            ));
        }

        if self.id_column.is_empty() {
            return Err(ModelError::Configuration(
                "Polymorphic ID column cannot be empty".to_string(),
            ));
        }

        if self.type_column == self.id_column {
            return Err(ModelError::Configuration(
                "Polymorphic type column and ID column must be different".to_string(),
            ));
        }

        Ok(())
    }
}
