//! Exporter registry
//!
//! Maps model names to an exporter (record to external representation) and
//! an optional query builder. Entries are resolved lazily into callables on
//! first use and memoized until the mapping is replaced.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use morph_orm::{ModelQuery, Record, SchemaRegistry};
use serde_json::Value;

use crate::config::{ExporterOptions, ExportersConfig};
use crate::error::{
    ExportResult, ExporterError, EXPORTER_NOT_DEFINED, INVALID_EXPORTER, INVALID_QUERY_BUILDER,
    UNDEFINED_EXPORTER,
};
use crate::resource::{resource_factory, ApiResource, ResourceCatalog, ResourceFactory};

/// Resolved exporter: `(record, context) -> representation`
pub type ModelExporterFn<C> = Arc<dyn Fn(&Record, &C) -> ExportResult<Value> + Send + Sync>;

/// Query customization: mutates the query handle before execution
pub type QueryBuilderFn<C> = Arc<dyn Fn(&mut ModelQuery, &C) + Send + Sync>;

/// How an entry declares its exporter
pub enum ExporterSpec<C> {
    Closure(ModelExporterFn<C>),
    /// Wrapper resource type, normalized into a closure on resolution
    Resource(ResourceFactory),
    /// Resource registered by name in the catalog
    Named(String),
}

/// How an entry declares its query builder
pub enum QueryBuilderSpec<C> {
    Closure(QueryBuilderFn<C>),
    /// Scope registered by name in the catalog
    Named(String),
}

impl<C> Clone for ExporterSpec<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Closure(f) => Self::Closure(f.clone()),
            Self::Resource(factory) => Self::Resource(factory.clone()),
            Self::Named(name) => Self::Named(name.clone()),
        }
    }
}

impl<C> Clone for QueryBuilderSpec<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Closure(f) => Self::Closure(f.clone()),
            Self::Named(name) => Self::Named(name.clone()),
        }
    }
}

impl<C> fmt::Debug for ExporterSpec<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closure(_) => f.write_str("Closure"),
            Self::Resource(_) => f.write_str("Resource"),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

impl<C> fmt::Debug for QueryBuilderSpec<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closure(_) => f.write_str("Closure"),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

/// Exporter configuration of one model
pub struct ExporterEntry<C = ()> {
    model_exporter: Option<ExporterSpec<C>>,
    query_builder: Option<QueryBuilderSpec<C>>,
}

impl<C> Default for ExporterEntry<C> {
    fn default() -> Self {
        Self {
            model_exporter: None,
            query_builder: None,
        }
    }
}

impl<C> Clone for ExporterEntry<C> {
    fn clone(&self) -> Self {
        Self {
            model_exporter: self.model_exporter.clone(),
            query_builder: self.query_builder.clone(),
        }
    }
}

impl<C> fmt::Debug for ExporterEntry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterEntry")
            .field("model_exporter", &self.model_exporter)
            .field("query_builder", &self.query_builder)
            .finish()
    }
}

impl<C: 'static> ExporterEntry<C> {
    /// Entry without an exporter; resolving it is a configuration error
    pub fn new() -> Self {
        Self::default()
    }

    /// Export with a closure
    pub fn exporter<F>(mut self, exporter: F) -> Self
    where
        F: Fn(&Record, &C) -> ExportResult<Value> + Send + Sync + 'static,
    {
        self.model_exporter = Some(ExporterSpec::Closure(Arc::new(exporter)));
        self
    }

    /// Export by wrapping records into resource `R`
    pub fn resource<R: ApiResource + 'static>(mut self) -> Self {
        self.model_exporter = Some(ExporterSpec::Resource(resource_factory::<R>()));
        self
    }

    /// Export with a resource registered in the catalog
    pub fn named(mut self, resource: &str) -> Self {
        self.model_exporter = Some(ExporterSpec::Named(resource.to_string()));
        self
    }

    /// Customize the batch query with a closure
    pub fn with_query_builder<F>(mut self, builder: F) -> Self
    where
        F: Fn(&mut ModelQuery, &C) + Send + Sync + 'static,
    {
        self.query_builder = Some(QueryBuilderSpec::Closure(Arc::new(builder)));
        self
    }

    /// Customize the batch query with a scope registered in the catalog
    pub fn with_named_query_builder(mut self, scope: &str) -> Self {
        self.query_builder = Some(QueryBuilderSpec::Named(scope.to_string()));
        self
    }

    pub fn model_exporter(&self) -> Option<&ExporterSpec<C>> {
        self.model_exporter.as_ref()
    }

    pub fn query_builder(&self) -> Option<&QueryBuilderSpec<C>> {
        self.query_builder.as_ref()
    }
}

/// Registry of morphed model exporters
///
/// Owns the exporter mapping, resolves entries on demand and drives the
/// batched morph-to loader (see [`load_morphed_models`]).
///
/// [`load_morphed_models`]: MorphedModelExporter::load_morphed_models
pub struct MorphedModelExporter<C = ()> {
    pub(crate) schema: Arc<SchemaRegistry>,
    catalog: ResourceCatalog<C>,
    pub(crate) options: ExporterOptions,
    exporters: HashMap<String, ExporterEntry<C>>,
    model_exporters: DashMap<String, Option<ModelExporterFn<C>>>,
    query_builders: DashMap<String, Option<QueryBuilderFn<C>>>,
}

impl<C> fmt::Debug for MorphedModelExporter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MorphedModelExporter")
            .field("options", &self.options)
            .field("exporters", &self.exporters)
            .field("catalog", &self.catalog)
            .field("resolved", &self.model_exporters.len())
            .finish()
    }
}

impl<C: 'static> MorphedModelExporter<C> {
    /// Create an empty registry over `schema`
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        Self {
            schema,
            catalog: ResourceCatalog::default(),
            options: ExporterOptions::default(),
            exporters: HashMap::new(),
            model_exporters: DashMap::new(),
            query_builders: DashMap::new(),
        }
    }

    /// Build a registry from a declarative configuration
    pub fn from_config(
        schema: Arc<SchemaRegistry>,
        catalog: ResourceCatalog<C>,
        config: ExportersConfig,
    ) -> Self {
        let entries = config.exporters.into_iter().map(|(model, entry)| {
            let entry = entry.unwrap_or_default();
            let mut exporter = ExporterEntry::new();
            if let Some(name) = entry.model_exporter {
                exporter = exporter.named(&name);
            }
            if let Some(name) = entry.query_builder {
                exporter = exporter.with_named_query_builder(&name);
            }
            (model, exporter)
        });

        Self::new(schema)
            .with_catalog(catalog)
            .with_options(config.options)
            .with_exporters(entries)
    }

    pub fn with_catalog(mut self, catalog: ResourceCatalog<C>) -> Self {
        self.catalog = catalog;
        self.clear_resolved();
        self
    }

    pub fn with_options(mut self, options: ExporterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_exporters<I, K>(mut self, exporters: I) -> Self
    where
        I: IntoIterator<Item = (K, ExporterEntry<C>)>,
        K: Into<String>,
    {
        self.register_exporters(exporters);
        self
    }

    /// Replace the whole exporter mapping and forget every resolved entry
    pub fn register_exporters<I, K>(&mut self, exporters: I)
    where
        I: IntoIterator<Item = (K, ExporterEntry<C>)>,
        K: Into<String>,
    {
        self.exporters = exporters
            .into_iter()
            .map(|(model, entry)| (model.into(), entry))
            .collect();
        self.clear_resolved();
        tracing::info!("Registered morphed model exporters for {} models", self.exporters.len());
    }

    fn clear_resolved(&mut self) {
        self.model_exporters.clear();
        self.query_builders.clear();
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn options(&self) -> &ExporterOptions {
        &self.options
    }

    pub fn has_exporters(&self) -> bool {
        !self.exporters.is_empty()
    }

    /// True if `model` resolves to an exporter; malformed entries still fail
    pub fn has_model_exporter(&self, model: &str) -> ExportResult<bool> {
        Ok(self.get_model_exporter(model)?.is_some())
    }

    /// Resolved exporter of `model`, `None` if the model is not configured
    pub fn get_model_exporter(&self, model: &str) -> ExportResult<Option<ModelExporterFn<C>>> {
        if let Some(resolved) = self.model_exporters.get(model) {
            return Ok(resolved.value().clone());
        }

        let resolved = self.resolve_model_exporter(model)?;
        self.model_exporters.insert(model.to_string(), resolved.clone());
        Ok(resolved)
    }

    fn resolve_model_exporter(&self, model: &str) -> ExportResult<Option<ModelExporterFn<C>>> {
        let Some(entry) = self.exporters.get(model) else {
            return Ok(None);
        };

        tracing::debug!("Resolving morphed model exporter for {}", model);

        let spec = entry
            .model_exporter
            .as_ref()
            .ok_or_else(|| ExporterError::Configuration(UNDEFINED_EXPORTER.to_string()))?;

        let factory = match spec {
            ExporterSpec::Closure(exporter) => return Ok(Some(exporter.clone())),
            ExporterSpec::Resource(factory) => factory.clone(),
            ExporterSpec::Named(name) => self
                .catalog
                .resource(name)
                .cloned()
                .ok_or_else(|| ExporterError::Configuration(INVALID_EXPORTER.to_string()))?,
        };

        let exporter: ModelExporterFn<C> = Arc::new(move |record: &Record, _: &C| factory(record));
        Ok(Some(exporter))
    }

    /// Resolved query builder of `model`, `None` if it declares none
    pub fn get_query_builder(&self, model: &str) -> ExportResult<Option<QueryBuilderFn<C>>> {
        if let Some(resolved) = self.query_builders.get(model) {
            return Ok(resolved.value().clone());
        }

        let resolved = match self.exporters.get(model).and_then(|e| e.query_builder.as_ref()) {
            None => None,
            Some(QueryBuilderSpec::Closure(builder)) => Some(builder.clone()),
            Some(QueryBuilderSpec::Named(name)) => Some(
                self.catalog
                    .scope(name)
                    .cloned()
                    .ok_or_else(|| {
                        ExporterError::Configuration(INVALID_QUERY_BUILDER.to_string())
                    })?,
            ),
        };

        self.query_builders.insert(model.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Query for the rows of `model` whose primary key is in `keys`,
    /// customized by the model's query builder; not executed
    pub fn build_query<T: Into<Value>>(
        &self,
        model: &str,
        keys: Vec<T>,
        ctx: &C,
    ) -> ExportResult<ModelQuery> {
        let mut query = ModelQuery::for_model(&self.schema, model)?;
        query.where_key_in(keys);

        if let Some(builder) = self.get_query_builder(model)? {
            builder(&mut query, ctx);
        }

        Ok(query)
    }

    /// Export a loaded record with the exporter of its model
    pub fn export_model(&self, record: Option<&Record>, ctx: &C) -> ExportResult<Option<Value>> {
        let Some(record) = record else {
            return Ok(None);
        };

        let exporter = self
            .get_model_exporter(record.model())?
            .ok_or_else(|| ExporterError::Runtime(EXPORTER_NOT_DEFINED.to_string()))?;

        exporter(record, ctx).map(Some)
    }

    /// Export the record attached to `owner`'s relation, if any
    pub fn export_related(
        &self,
        owner: &Record,
        relation: &str,
        ctx: &C,
    ) -> ExportResult<Option<Value>> {
        self.export_model(owner.related(relation), ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use morph_orm::{ModelSchema, RelationshipMetadata};
    use serde_json::json;

    fn schema() -> Arc<SchemaRegistry> {
        let mut schema = SchemaRegistry::new();
        schema
            .register(ModelSchema::new("Appointment", "appointments"))
            .unwrap();
        schema
            .register(
                ModelSchema::new("TrainingSession", "training_sessions")
                    .soft_deletes(true)
                    .with_relationship(RelationshipMetadata::belongs_to(
                        "program",
                        "TrainingProgram",
                        "training_program_id",
                    )),
            )
            .unwrap();
        Arc::new(schema)
    }

    fn id_exporter(record: &Record, _: &()) -> ExportResult<Value> {
        Ok(json!({ "id": record.key() }))
    }

    #[test]
    fn test_has_exporters() {
        let mut exporter: MorphedModelExporter = MorphedModelExporter::new(schema());
        assert!(!exporter.has_exporters());

        exporter.register_exporters([("Appointment", ExporterEntry::new().exporter(id_exporter))]);
        assert!(exporter.has_exporters());
        assert!(exporter.has_model_exporter("Appointment").unwrap());
        assert!(!exporter.has_model_exporter("TrainingSession").unwrap());
    }

    #[test]
    fn test_undefined_exporter() {
        let exporter: MorphedModelExporter =
            MorphedModelExporter::new(schema()).with_exporters([("X", ExporterEntry::new())]);

        let err = exporter.get_model_exporter("X").err().unwrap();
        assert_eq!(err.to_string(), "undefined morphed model exporter");
        assert!(err.is_configuration());
        assert!(exporter.has_model_exporter("X").is_err());
    }

    #[test]
    fn test_unknown_named_exporter() {
        let exporter: MorphedModelExporter = MorphedModelExporter::new(schema())
            .with_exporters([("Appointment", ExporterEntry::new().named("appointmnet"))]);

        assert_eq!(
            exporter.get_model_exporter("Appointment").err().unwrap().to_string(),
            "invalid morphed model exporter, it must be a Closure or an API resource class"
        );
    }

    struct KeyResource {
        key: Value,
    }

    impl ApiResource for KeyResource {
        fn from_record(record: &Record) -> ExportResult<Self> {
            Ok(Self {
                key: record.key().cloned().unwrap_or(Value::Null),
            })
        }

        fn to_json(&self) -> ExportResult<Value> {
            Ok(json!({ "key": self.key }))
        }
    }

    #[test]
    fn test_memoized_resolution() {
        let mut exporter: MorphedModelExporter = MorphedModelExporter::new(schema())
            .with_catalog(ResourceCatalog::new().with_resource::<KeyResource>("appointment"))
            .with_exporters([("Appointment", ExporterEntry::new().named("appointment"))]);

        // each resolution wraps the catalog factory in a fresh closure
        let first = exporter.get_model_exporter("Appointment").unwrap().unwrap();
        let second = exporter.get_model_exporter("Appointment").unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let appointment = Record::new("Appointment").with_attribute("id", 4);
        assert_eq!(first(&appointment, &()).unwrap(), json!({ "key": 4 }));

        exporter.register_exporters([(
            "Appointment",
            ExporterEntry::new().resource::<KeyResource>(),
        )]);
        let replaced = exporter.get_model_exporter("Appointment").unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &replaced));
        assert!(Arc::ptr_eq(
            &replaced,
            &exporter.get_model_exporter("Appointment").unwrap().unwrap()
        ));
    }

    #[test]
    fn test_empty_names_in_config_are_invalid() {
        let config = ExportersConfig::from_json_str(
            r#"{ "exporters": { "Appointment": { "model_exporter": "", "query_builder": "" } } }"#,
        )
        .unwrap();
        let exporter: MorphedModelExporter =
            MorphedModelExporter::from_config(schema(), ResourceCatalog::new(), config);

        assert_eq!(
            exporter.get_model_exporter("Appointment").err().unwrap().to_string(),
            "invalid morphed model exporter, it must be a Closure or an API resource class"
        );
        assert_eq!(
            exporter.get_query_builder("Appointment").err().unwrap().to_string(),
            "invalid query builder, it must be a Closure"
        );
    }

    #[test]
    fn test_build_query() {
        let exporter: MorphedModelExporter = MorphedModelExporter::new(schema()).with_exporters([(
            "TrainingSession",
            ExporterEntry::new()
                .exporter(id_exporter)
                .with_query_builder(|query: &mut ModelQuery, _: &()| {
                    query.select(&["id", "training_program_id"]).with("program");
                }),
        )]);

        let query = exporter.build_query("TrainingSession", vec![1, 3], &()).unwrap();
        assert_eq!(
            query.to_sql(),
            "SELECT id, training_program_id FROM training_sessions WHERE deleted_at IS NULL AND id IN (1, 3)"
        );
        assert_eq!(query.eager_loads().len(), 1);

        let plain = exporter.build_query("Appointment", vec![7], &()).unwrap();
        assert_eq!(plain.to_sql(), "SELECT * FROM appointments WHERE id IN (7)");
    }

    #[test]
    fn test_invalid_query_builder() {
        let exporter: MorphedModelExporter = MorphedModelExporter::new(schema()).with_exporters([(
            "Appointment",
            ExporterEntry::new()
                .exporter(id_exporter)
                .with_named_query_builder("missing"),
        )]);

        assert_eq!(
            exporter.build_query("Appointment", vec![1], &()).err().unwrap().to_string(),
            "invalid query builder, it must be a Closure"
        );
    }

    #[test]
    fn test_export_model() {
        let exporter: MorphedModelExporter = MorphedModelExporter::new(schema())
            .with_exporters([("Appointment", ExporterEntry::new().exporter(id_exporter))]);

        assert_eq!(exporter.export_model(None, &()).unwrap(), None);

        let appointment = Record::new("Appointment").with_attribute("id", 2);
        assert_eq!(
            exporter.export_model(Some(&appointment), &()).unwrap(),
            Some(json!({ "id": 2 }))
        );

        let session = Record::new("TrainingSession").with_attribute("id", 2);
        assert_eq!(
            exporter.export_model(Some(&session), &()).err().unwrap().to_string(),
            "exporter not defined"
        );
    }

    #[test]
    fn test_context_forwarded() {
        let exporter: MorphedModelExporter<String> =
            MorphedModelExporter::new(schema()).with_exporters([(
                "Appointment",
                ExporterEntry::new().exporter(|record: &Record, locale: &String| {
                    Ok(json!({ "id": record.key(), "locale": locale }))
                }),
            )]);

        let appointment = Record::new("Appointment").with_attribute("id", 1);
        assert_eq!(
            exporter
                .export_model(Some(&appointment), &"nl".to_string())
                .unwrap(),
            Some(json!({ "id": 1, "locale": "nl" }))
        );
    }
}
