//! # morphed-model-exporter
//!
//! Registry of per-model exporters for polymorphic (morph-to) relations.
//!
//! A batch of owner records pointing at several target models through one
//! morph-to relation is loaded with one query per referenced model, and each
//! loaded target is converted to its external representation by the
//! exporter registered for its model.
//!
//! ```ignore
//! let exporter: MorphedModelExporter = MorphedModelExporter::new(schema)
//!     .with_exporters([
//!         ("Appointment", ExporterEntry::new().resource::<AppointmentResource>()),
//!         ("TrainingSession", ExporterEntry::new()
//!             .exporter(|session, _| Ok(session.to_json()))
//!             .with_query_builder(|query, _| { query.with("program"); })),
//!     ]);
//!
//! exporter.load_morphed_models(&conn, &mut todos, "todoable", &()).await?;
//! let todoable = exporter.export_related(&todos[0], "todoable", &())?;
//! ```

pub mod config;
pub mod error;
pub mod loader;
pub mod registry;
pub mod resource;

pub use config::{ConfigError, ExporterConfigEntry, ExporterOptions, ExportersConfig};
pub use error::{ExportResult, ExporterError};
pub use loader::LoadSummary;
pub use registry::{
    ExporterEntry, ExporterSpec, ModelExporterFn, MorphedModelExporter, QueryBuilderFn,
    QueryBuilderSpec,
};
pub use resource::{resource_factory, ApiResource, ResourceCatalog, ResourceFactory};
