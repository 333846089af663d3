//! Shared fixtures: a small training/todo application
#![allow(dead_code)]

use std::sync::Arc;

use morph_orm::{
    MemoryConnection, Model, ModelQuery, Record, RelationshipMetadata, SchemaRegistry,
};
use morphed_model_exporter::{ApiResource, ExportResult, ExporterError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const CREATED_AT: &str = "2024-05-01T10:00:00Z";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub deleted_at: Option<String>,
}

impl Model for User {
    fn model_name() -> &'static str {
        "User"
    }

    fn table_name() -> &'static str {
        "users"
    }

    fn uses_soft_deletes() -> bool {
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub id: i64,
    pub title: String,
    pub todoable_type: Option<String>,
    pub todoable_id: Option<i64>,
    pub creator_id: Option<i64>,
    pub deleted_at: Option<String>,
}

impl Model for Todo {
    fn model_name() -> &'static str {
        "Todo"
    }

    fn table_name() -> &'static str {
        "todos"
    }

    fn uses_soft_deletes() -> bool {
        true
    }

    fn relationships() -> Vec<RelationshipMetadata> {
        vec![
            RelationshipMetadata::morph_to("todoable"),
            RelationshipMetadata::belongs_to("creator", "User", "creator_id"),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingProgram {
    pub id: i64,
    pub name: String,
    pub deleted_at: Option<String>,
}

impl Model for TrainingProgram {
    fn model_name() -> &'static str {
        "TrainingProgram"
    }

    fn table_name() -> &'static str {
        "training_programs"
    }

    fn uses_soft_deletes() -> bool {
        true
    }

    fn relationships() -> Vec<RelationshipMetadata> {
        vec![RelationshipMetadata::has_many("sessions", "TrainingSession", "training_program_id")]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSession {
    pub id: i64,
    pub training_program_id: i64,
    pub deleted_at: Option<String>,
}

impl Model for TrainingSession {
    fn model_name() -> &'static str {
        "TrainingSession"
    }

    fn table_name() -> &'static str {
        "training_sessions"
    }

    fn uses_soft_deletes() -> bool {
        true
    }

    fn relationships() -> Vec<RelationshipMetadata> {
        vec![
            RelationshipMetadata::belongs_to("program", "TrainingProgram", "training_program_id"),
            RelationshipMetadata::morph_one("todo", "Todo", "todoable"),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

impl Model for Appointment {
    fn model_name() -> &'static str {
        "Appointment"
    }

    fn table_name() -> &'static str {
        "appointments"
    }

    fn uses_soft_deletes() -> bool {
        true
    }
}

/// Exposes an appointment's id and creation time
#[derive(Debug)]
pub struct AppointmentResource {
    appointment: Appointment,
}

impl ApiResource for AppointmentResource {
    fn from_record(record: &Record) -> ExportResult<Self> {
        Ok(Self {
            appointment: Appointment::from_record(record)?,
        })
    }

    fn to_json(&self) -> ExportResult<Value> {
        Ok(json!({
            "id": self.appointment.id,
            "created_at": self.appointment.created_at,
        }))
    }
}

/// Exposes a training program's name only
pub struct ProgramResource {
    name: String,
}

impl ApiResource for ProgramResource {
    fn from_record(record: &Record) -> ExportResult<Self> {
        let name = record
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ExporterError::Export("program without name".to_string()))?;
        Ok(Self { name: name.to_string() })
    }

    fn to_json(&self) -> ExportResult<Value> {
        Ok(json!({ "name": self.name }))
    }
}

pub fn schema() -> Arc<SchemaRegistry> {
    let mut schema = SchemaRegistry::new();
    schema.register_model::<User>().unwrap();
    schema.register_model::<Todo>().unwrap();
    schema.register_model::<TrainingProgram>().unwrap();
    schema.register_model::<TrainingSession>().unwrap();
    schema.register_model::<Appointment>().unwrap();
    schema.morph_map([
        ("user", "User"),
        ("program", "TrainingProgram"),
        ("session", "TrainingSession"),
        ("appointment", "Appointment"),
    ]);
    Arc::new(schema)
}

pub fn connection() -> MemoryConnection {
    let conn = MemoryConnection::new();
    for table in ["users", "todos", "training_programs", "training_sessions", "appointments"] {
        conn.create_table(table);
    }
    conn
}

pub fn create_program(conn: &MemoryConnection, name: &str) -> i64 {
    id(conn.insert("training_programs", json!({ "name": name, "deleted_at": null })))
}

pub fn create_session(conn: &MemoryConnection, program_id: i64) -> i64 {
    id(conn.insert(
        "training_sessions",
        json!({ "training_program_id": program_id, "created_at": CREATED_AT, "deleted_at": null }),
    ))
}

pub fn create_appointment(conn: &MemoryConnection) -> i64 {
    id(conn.insert("appointments", json!({ "created_at": CREATED_AT, "deleted_at": null })))
}

pub fn create_deleted_appointment(conn: &MemoryConnection) -> i64 {
    id(conn.insert(
        "appointments",
        json!({ "created_at": CREATED_AT, "deleted_at": "2024-05-02T10:00:00Z" }),
    ))
}

pub fn create_todo(
    conn: &MemoryConnection,
    todoable_type: Option<&str>,
    todoable_id: Option<i64>,
) -> i64 {
    id(conn.insert(
        "todos",
        json!({
            "title": "Prepare",
            "todoable_type": todoable_type,
            "todoable_id": todoable_id,
            "creator_id": null,
            "deleted_at": null,
        }),
    ))
}

/// A session of a fresh program, with a todo pointing at it
pub fn create_session_with_todo(conn: &MemoryConnection) -> (i64, i64) {
    let program_id = create_program(conn, "Strength");
    let session_id = create_session(conn, program_id);
    create_todo(conn, Some("session"), Some(session_id));
    (session_id, program_id)
}

/// An appointment with a todo pointing at it
pub fn create_appointment_with_todo(conn: &MemoryConnection) -> i64 {
    let appointment_id = create_appointment(conn);
    create_todo(conn, Some("appointment"), Some(appointment_id));
    appointment_id
}

/// Every live todo, by id
pub async fn all_todos(conn: &MemoryConnection, schema: &SchemaRegistry) -> Vec<Record> {
    let mut query = ModelQuery::for_model(schema, "Todo").unwrap();
    query.order_by("id");
    let todos = query.get(conn, schema).await.unwrap();
    conn.clear_query_log();
    todos
}

fn id(inserted: morph_orm::ModelResult<Value>) -> i64 {
    inserted.unwrap().as_i64().unwrap()
}
