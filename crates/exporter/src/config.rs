//! Configuration for the exporter registry
//!
//! `ExporterOptions` tunes loader behavior and can be read from the
//! environment. `ExportersConfig` is the declarative form of an exporter
//! mapping, loadable from JSON or YAML; the names it contains are resolved
//! against a `ResourceCatalog` on first use.

use std::collections::BTreeMap;
use std::env;

use serde::{Deserialize, Serialize};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration parsing error: {message}")]
    ParseError { message: String },
}

/// Loader behavior options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterOptions {
    /// Fail instead of skipping owners whose morph type has no exporter
    pub strict_morph_types: bool,
    /// Build every group's query first, then run them concurrently
    pub parallel_queries: bool,
}

impl ExporterOptions {
    pub fn strict(mut self, enabled: bool) -> Self {
        self.strict_morph_types = enabled;
        self
    }

    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel_queries = enabled;
        self
    }

    /// Load options from `MORPH_EXPORTER_STRICT` and `MORPH_EXPORTER_PARALLEL`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut options = Self::default();

        if let Ok(value) = env::var("MORPH_EXPORTER_STRICT") {
            options.strict_morph_types = parse_flag("MORPH_EXPORTER_STRICT", &value)?;
        }

        if let Ok(value) = env::var("MORPH_EXPORTER_PARALLEL") {
            options.parallel_queries = parse_flag("MORPH_EXPORTER_PARALLEL", &value)?;
        }

        Ok(options)
    }
}

fn parse_flag(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            expected: "true, false, 1 or 0".to_string(),
        }),
    }
}

/// Declarative exporter entry; names refer to catalog resources and scopes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfigEntry {
    pub model_exporter: Option<String>,
    pub query_builder: Option<String>,
}

/// Declarative exporter mapping
///
/// ```yaml
/// options:
///   strict_morph_types: false
/// exporters:
///   Appointment:
///     model_exporter: appointment
///   TrainingSession:
///     model_exporter: session
///     query_builder: with_program
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportersConfig {
    pub options: ExporterOptions,
    /// Model name -> entry; a null entry declares the model without an exporter
    pub exporters: BTreeMap<String, Option<ExporterConfigEntry>>,
}

impl ExportersConfig {
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(source).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(source).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }
}
