//! Eager Loading - Loads requested relations onto fetched records
//!
//! Prevents N+1 query problems: each relation level costs one query
//! (one per target model for morph-to relations), however many parent
//! records there are.

use std::collections::HashMap;

use serde_json::Value;

use crate::connection::Connection;
use crate::error::{ModelError, ModelResult};
use crate::model::{normalize_key, Loaded, Record};
use crate::model_query::{EagerLoad, ModelQuery};
use crate::schema::{ModelSchema, RelationshipMetadata, RelationshipType, SchemaRegistry};

/// One top-level relation with everything requested below it
#[derive(Debug, Default)]
struct RelationPlan {
    columns: Vec<String>,
    nested: Vec<EagerLoad>,
}

/// Fold eager load paths into one plan per top-level relation, in request order
fn plan(loads: &[EagerLoad]) -> Vec<(String, RelationPlan)> {
    let mut plans: Vec<(String, RelationPlan)> = Vec::new();

    for load in loads {
        let (head, rest) = match load.path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (load.path.as_str(), None),
        };

        let index = match plans.iter().position(|(name, _)| name == head) {
            Some(index) => index,
            None => {
                plans.push((head.to_string(), RelationPlan::default()));
                plans.len() - 1
            }
        };

        let entry = &mut plans[index].1;
        match rest {
            Some(rest) => entry.nested.push(EagerLoad {
                path: rest.to_string(),
                columns: load.columns.clone(),
            }),
            None => entry.columns = load.columns.clone(),
        }
    }

    plans
}

/// Load every requested relation onto `records`
///
/// All records must belong to the same model.
pub(crate) async fn load_relations(
    records: &mut [Record],
    loads: &[EagerLoad],
    conn: &dyn Connection,
    schema: &SchemaRegistry,
) -> ModelResult<()> {
    let Some(first) = records.first() else {
        return Ok(());
    };
    let parent_model = first.model().to_string();

    for (name, relation_plan) in plan(loads) {
        let metadata = schema
            .relationship(&parent_model, &name)
            .ok_or_else(|| {
                ModelError::Relationship(format!(
                    "relationship '{}' is not defined on model '{}'",
                    name, parent_model
                ))
            })?
            .clone();

        tracing::debug!(
            "Eager loading {:?} relationship '{}' for {} {} records",
            metadata.relationship_type,
            name,
            records.len(),
            parent_model
        );

        match metadata.relationship_type {
            RelationshipType::BelongsTo => {
                load_belongs_to(records, &metadata, &relation_plan, conn, schema).await?
            }
            RelationshipType::HasOne | RelationshipType::HasMany => {
                load_has(records, &metadata, &relation_plan, None, conn, schema).await?
            }
            RelationshipType::MorphOne | RelationshipType::MorphMany => {
                let poly = metadata.polymorphic()?;
                let alias = schema.morph_alias(&parent_model).to_string();
                let type_filter = (poly.type_column.clone(), alias);
                load_has(records, &metadata, &relation_plan, Some(type_filter), conn, schema).await?
            }
            RelationshipType::MorphTo => {
                load_morph_to(records, &metadata, &relation_plan, conn, schema).await?
            }
        }
    }

    Ok(())
}

fn related_query(related: &ModelSchema, relation_plan: &RelationPlan) -> ModelQuery {
    let mut query = ModelQuery::new(related);
    if !relation_plan.columns.is_empty() {
        let columns: Vec<&str> = relation_plan.columns.iter().map(String::as_str).collect();
        query.select(&columns);
    }
    for nested in &relation_plan.nested {
        query.with_columns(
            &nested.path,
            &nested.columns.iter().map(String::as_str).collect::<Vec<_>>(),
        );
    }
    query
}

/// Distinct, non-null values of `column` across `records`
fn distinct_values<'a>(records: impl IntoIterator<Item = &'a Record>, column: &str) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    records
        .into_iter()
        .filter_map(|record| record.get(column))
        .filter(|value| normalize_key(value).map(|key| seen.insert(key)).unwrap_or(false))
        .cloned()
        .collect()
}

fn lookup_key(record: &Record, column: &str) -> Option<String> {
    record.get(column).and_then(normalize_key)
}

async fn load_belongs_to(
    records: &mut [Record],
    metadata: &RelationshipMetadata,
    relation_plan: &RelationPlan,
    conn: &dyn Connection,
    schema: &SchemaRegistry,
) -> ModelResult<()> {
    let related = schema.require(metadata.related()?)?;
    let keys = distinct_values(records.iter(), &metadata.foreign_key);

    let mut query = related_query(related, relation_plan);
    let owner_key = metadata.local_key.clone();
    query.apply(|b| b.where_in(&owner_key, keys));

    let mut index: HashMap<String, Record> = HashMap::new();
    for record in query.get(conn, schema).await? {
        if let Some(key) = lookup_key(&record, &metadata.local_key) {
            index.insert(key, record);
        }
    }

    for record in records.iter_mut() {
        let target =
            lookup_key(record, &metadata.foreign_key).and_then(|key| index.get(&key).cloned());
        record.set_relation(&metadata.name, Loaded::one(target));
    }

    Ok(())
}

async fn load_has(
    records: &mut [Record],
    metadata: &RelationshipMetadata,
    relation_plan: &RelationPlan,
    type_filter: Option<(String, String)>,
    conn: &dyn Connection,
    schema: &SchemaRegistry,
) -> ModelResult<()> {
    let related = schema.require(metadata.related()?)?;
    let keys = distinct_values(records.iter(), &metadata.local_key);

    let mut query = related_query(related, relation_plan);
    if let Some((type_column, alias)) = type_filter {
        query.where_eq(&type_column, alias);
    }
    query.where_in(&metadata.foreign_key, keys);

    let mut grouped: HashMap<String, Vec<Record>> = HashMap::new();
    for record in query.get(conn, schema).await? {
        if let Some(key) = lookup_key(&record, &metadata.foreign_key) {
            grouped.entry(key).or_default().push(record);
        }
    }

    for record in records.iter_mut() {
        let children = lookup_key(record, &metadata.local_key)
            .and_then(|key| grouped.get(&key).cloned())
            .unwrap_or_default();

        let loaded = if metadata.relationship_type.is_collection() {
            Loaded::Many(children)
        } else {
            Loaded::one(children.into_iter().next())
        };
        record.set_relation(&metadata.name, loaded);
    }

    Ok(())
}

async fn load_morph_to(
    records: &mut [Record],
    metadata: &RelationshipMetadata,
    relation_plan: &RelationPlan,
    conn: &dyn Connection,
    schema: &SchemaRegistry,
) -> ModelResult<()> {
    let poly = metadata.polymorphic()?;

    // token -> indices of the records carrying it, in first-appearance order
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (index, record) in records.iter_mut().enumerate() {
        let token = record
            .get(&poly.type_column)
            .and_then(normalize_key)
            .filter(|token| !token.is_empty());

        match token {
            Some(token) => match groups.iter_mut().find(|(existing, _)| *existing == token) {
                Some((_, indices)) => indices.push(index),
                None => groups.push((token, vec![index])),
            },
            None => record.set_relation(&metadata.name, Loaded::one(None)),
        }
    }

    for (token, indices) in groups {
        let related = schema.require(schema.resolve_morph_type(&token))?;
        let keys = distinct_values(indices.iter().map(|&i| &records[i]), &poly.id_column);

        let mut query = related_query(related, relation_plan);
        query.where_key_in(keys);
        let targets = query.get_keyed(conn, schema).await?;

        for index in indices {
            let record = &mut records[index];
            let target =
                lookup_key(record, &poly.id_column).and_then(|key| targets.get(&key).cloned());
            record.set_relation(&metadata.name, Loaded::one(target));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemoryConnection;
    use serde_json::json;

    fn schema() -> SchemaRegistry {
        let mut schema = SchemaRegistry::new();
        schema
            .register(
                ModelSchema::new("TrainingProgram", "training_programs")
                    .with_relationship(RelationshipMetadata::has_many(
                        "sessions",
                        "TrainingSession",
                        "training_program_id",
                    )),
            )
            .unwrap();
        schema
            .register(
                ModelSchema::new("TrainingSession", "training_sessions")
                    .soft_deletes(true)
                    .with_relationship(RelationshipMetadata::belongs_to(
                        "program",
                        "TrainingProgram",
                        "training_program_id",
                    ))
                    .with_relationship(RelationshipMetadata::morph_one("todo", "Todo", "todoable")),
            )
            .unwrap();
        schema
            .register(
                ModelSchema::new("Todo", "todos")
                    .with_relationship(RelationshipMetadata::morph_to("todoable")),
            )
            .unwrap();
        schema.register(ModelSchema::new("Appointment", "appointments")).unwrap();
        schema.morph_map([("session", "TrainingSession"), ("appointment", "Appointment")]);
        schema
    }

    fn seeded() -> MemoryConnection {
        let conn = MemoryConnection::new();
        conn.insert("training_programs", json!({ "name": "Strength" })).unwrap();
        conn.insert("training_programs", json!({ "name": "Cardio" })).unwrap();
        conn.insert("training_sessions", json!({ "training_program_id": 1 })).unwrap();
        conn.insert("training_sessions", json!({ "training_program_id": 1 })).unwrap();
        conn.insert("training_sessions", json!({ "training_program_id": 2 })).unwrap();
        conn.insert("appointments", json!({})).unwrap();
        conn.insert("todos", json!({ "todoable_type": "session", "todoable_id": 2 })).unwrap();
        conn.insert("todos", json!({ "todoable_type": "appointment", "todoable_id": 1 })).unwrap();
        conn.insert("todos", json!({ "todoable_type": null, "todoable_id": null })).unwrap();
        conn
    }

    #[test]
    fn test_plan_merges_paths() {
        let loads = vec![
            EagerLoad::parse("program:id,name"),
            EagerLoad::parse("program.sessions"),
            EagerLoad::parse("todo"),
        ];
        let plans = plan(&loads);

        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].0, "program");
        assert_eq!(plans[0].1.columns, vec!["id", "name"]);
        assert_eq!(plans[0].1.nested[0].path, "sessions");
        assert_eq!(plans[1].0, "todo");
    }

    #[tokio::test]
    async fn test_belongs_to_with_columns_is_one_query() {
        let schema = schema();
        let conn = seeded();

        let mut query = ModelQuery::for_model(&schema, "TrainingSession").unwrap();
        query.with("program:id,name");
        let sessions = query.get(&conn, &schema).await.unwrap();

        assert_eq!(sessions.len(), 3);
        assert_eq!(conn.query_count(), 2);
        assert_eq!(
            sessions[0].related("program").map(Record::to_json),
            Some(json!({ "id": 1, "name": "Strength" }))
        );
        assert_eq!(
            sessions[2].related("program").and_then(|p| p.get("name")),
            Some(&json!("Cardio"))
        );
    }

    #[tokio::test]
    async fn test_has_many_and_nested() {
        let schema = schema();
        let conn = seeded();

        let mut query = ModelQuery::for_model(&schema, "TrainingProgram").unwrap();
        query.with("sessions.program");
        let programs = query.get(&conn, &schema).await.unwrap();

        assert_eq!(programs[0].related_many("sessions").map(<[Record]>::len), Some(2));
        assert_eq!(programs[1].related_many("sessions").map(<[Record]>::len), Some(1));
        let nested = &programs[0].related_many("sessions").unwrap()[0];
        assert!(nested.related("program").is_some());
        assert_eq!(conn.query_count(), 3);
    }

    #[tokio::test]
    async fn test_morph_one_filters_on_alias() {
        let schema = schema();
        let conn = seeded();

        let mut query = ModelQuery::for_model(&schema, "TrainingSession").unwrap();
        query.with("todo");
        let sessions = query.get(&conn, &schema).await.unwrap();

        assert!(sessions[0].related("todo").is_none());
        assert_eq!(sessions[1].related("todo").and_then(Record::key), Some(&json!(1)));
        assert!(conn.queries()[1].contains("todoable_type = 'session'"));
    }

    #[tokio::test]
    async fn test_morph_to_queries_once_per_type() {
        let schema = schema();
        let conn = seeded();

        let mut query = ModelQuery::for_model(&schema, "Todo").unwrap();
        query.with("todoable");
        let todos = query.get(&conn, &schema).await.unwrap();

        assert_eq!(todos[0].related("todoable").map(Record::model), Some("TrainingSession"));
        assert_eq!(todos[1].related("todoable").map(Record::model), Some("Appointment"));
        assert!(todos[2].relation_loaded("todoable"));
        assert!(todos[2].related("todoable").is_none());
        assert_eq!(conn.query_count(), 3);
    }

    #[tokio::test]
    async fn test_morph_to_numeric_type_token() {
        let mut schema = schema();
        schema.morph_map([("1", "Appointment")]);
        let conn = MemoryConnection::new();
        conn.insert("appointments", json!({})).unwrap();
        conn.insert("todos", json!({ "todoable_type": 1, "todoable_id": 1 })).unwrap();

        let mut query = ModelQuery::for_model(&schema, "Todo").unwrap();
        query.with("todoable");
        let todos = query.get(&conn, &schema).await.unwrap();

        assert_eq!(todos[0].related("todoable").map(Record::model), Some("Appointment"));
        assert_eq!(conn.query_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_relation_is_an_error() {
        let schema = schema();
        let conn = seeded();

        let mut query = ModelQuery::for_model(&schema, "Appointment").unwrap();
        query.with("owner");
        let result = query.get(&conn, &schema).await;
        assert!(matches!(result, Err(ModelError::Relationship(_))));
    }
}
