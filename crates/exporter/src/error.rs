//! Error types for morphed model exporting

use morph_orm::ModelError;

pub(crate) const UNDEFINED_EXPORTER: &str = "undefined morphed model exporter";
pub(crate) const INVALID_EXPORTER: &str =
    "invalid morphed model exporter, it must be a Closure or an API resource class";
pub(crate) const INVALID_QUERY_BUILDER: &str = "invalid query builder, it must be a Closure";
pub(crate) const EXPORTER_NOT_DEFINED: &str = "exporter not defined";

/// Result type alias for exporter operations
pub type ExportResult<T> = Result<T, ExporterError>;

/// Errors raised by the exporter registry, loader and dispatcher
#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    /// Exporter or relationship configuration is invalid
    #[error("{0}")]
    Configuration(String),

    /// Usage error at export time
    #[error("{0}")]
    Runtime(String),

    /// Failure in the data-access layer
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Failure inside a caller-supplied exporter
    #[error("export failed: {0}")]
    Export(String),
}

impl ExporterError {
    pub(crate) fn invalid_relationship(relation: &str) -> Self {
        ExporterError::Configuration(format!(
            "invalid relationship '{}', it must be a MorphTo relationship",
            relation
        ))
    }

    /// True for configuration errors
    pub fn is_configuration(&self) -> bool {
        matches!(self, ExporterError::Configuration(_))
    }
}

impl From<serde_json::Error> for ExporterError {
    fn from(err: serde_json::Error) -> Self {
        ExporterError::Export(err.to_string())
    }
}
