//! API resources and the named resource catalog

use std::collections::HashMap;
use std::sync::Arc;

use morph_orm::{ModelQuery, Record};
use serde_json::Value;

use crate::error::ExportResult;
use crate::registry::QueryBuilderFn;

/// A presentation wrapper built from a loaded record
pub trait ApiResource: Sized {
    /// Wrap a record
    fn from_record(record: &Record) -> ExportResult<Self>;

    /// External representation of the wrapped record
    fn to_json(&self) -> ExportResult<Value>;
}

/// Record to representation conversion for a resource type
pub type ResourceFactory = Arc<dyn Fn(&Record) -> ExportResult<Value> + Send + Sync>;

/// Factory wrapping records into `R`
pub fn resource_factory<R: ApiResource + 'static>() -> ResourceFactory {
    Arc::new(|record: &Record| R::from_record(record)?.to_json())
}

/// Resources and query scopes addressable by name, for declarative configuration
pub struct ResourceCatalog<C = ()> {
    resources: HashMap<String, ResourceFactory>,
    scopes: HashMap<String, QueryBuilderFn<C>>,
}

impl<C> Default for ResourceCatalog<C> {
    fn default() -> Self {
        Self {
            resources: HashMap::new(),
            scopes: HashMap::new(),
        }
    }
}

impl<C> Clone for ResourceCatalog<C> {
    fn clone(&self) -> Self {
        Self {
            resources: self.resources.clone(),
            scopes: self.scopes.clone(),
        }
    }
}

impl<C> std::fmt::Debug for ResourceCatalog<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut resources: Vec<&str> = self.resources.keys().map(String::as_str).collect();
        let mut scopes: Vec<&str> = self.scopes.keys().map(String::as_str).collect();
        resources.sort_unstable();
        scopes.sort_unstable();
        f.debug_struct("ResourceCatalog")
            .field("resources", &resources)
            .field("scopes", &scopes)
            .finish()
    }
}

impl<C: 'static> ResourceCatalog<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register resource type `R` under `name`
    pub fn with_resource<R: ApiResource + 'static>(self, name: &str) -> Self {
        self.with_factory(name, resource_factory::<R>())
    }

    /// Register a resource factory under `name`
    pub fn with_factory(mut self, name: &str, factory: ResourceFactory) -> Self {
        self.resources.insert(name.to_string(), factory);
        self
    }

    /// Register a query scope under `name`
    pub fn with_scope<F>(mut self, name: &str, scope: F) -> Self
    where
        F: Fn(&mut ModelQuery, &C) + Send + Sync + 'static,
    {
        self.scopes.insert(name.to_string(), Arc::new(scope));
        self
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceFactory> {
        self.resources.get(name)
    }

    pub fn scope(&self, name: &str) -> Option<&QueryBuilderFn<C>> {
        self.scopes.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.scopes.is_empty()
    }
}
