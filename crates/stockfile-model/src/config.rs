use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::registry::{SchemaError, SchemaRegistry};
use crate::schema::DocumentSchema;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
pub const DEFAULT_PROCESSING_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods", "csv"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid schema configuration: {0}")]
    Schema(#[from] SchemaError),
}

/// Limits and schemas the file processor runs with.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Files larger than this are rejected before decoding.
    pub max_file_size: u64,
    /// Lowercase extensions without the leading dot.
    pub allowed_extensions: Vec<String>,
    /// Wall-clock budget for one `process_file` call.
    pub processing_timeout: Duration,
    pub registry: SchemaRegistry,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            processing_timeout: DEFAULT_PROCESSING_TIMEOUT,
            registry: SchemaRegistry::builtin(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
struct RawProcessorConfig {
    max_file_size: u64,
    allowed_extensions: Vec<String>,
    processing_timeout_ms: u64,
    schemas: Option<Vec<DocumentSchema>>,
}

impl Default for RawProcessorConfig {
    fn default() -> Self {
        let defaults = ProcessorConfig::default();
        Self {
            max_file_size: defaults.max_file_size,
            allowed_extensions: defaults.allowed_extensions,
            processing_timeout_ms: defaults.processing_timeout.as_millis() as u64,
            schemas: None,
        }
    }
}

impl ProcessorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let raw: RawProcessorConfig = serde_json::from_str(json)?;
        let registry = match raw.schemas {
            Some(schemas) => SchemaRegistry::new(schemas)?,
            None => SchemaRegistry::builtin(),
        };
        Ok(Self {
            max_file_size: raw.max_file_size,
            allowed_extensions: raw
                .allowed_extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .collect(),
            processing_timeout: Duration::from_millis(raw.processing_timeout_ms),
            registry,
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.processing_timeout = timeout;
        self
    }

    pub fn with_allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_extensions = extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .collect();
        self
    }

    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn is_extension_allowed(&self, extension: &str) -> bool {
        let extension = normalize_extension(extension);
        self.allowed_extensions.iter().any(|allowed| *allowed == extension)
    }
}

/// `".XLSX"` -> `"xlsx"`.
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentType;

    #[test]
    fn empty_json_yields_defaults() {
        let config = ProcessorConfig::from_json_str("{}").unwrap();
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(config.processing_timeout, DEFAULT_PROCESSING_TIMEOUT);
        assert!(config.is_extension_allowed(".XLSX"));
        assert!(config.registry.get_schema(DocumentType::Osr).is_ok());
    }

    #[test]
    fn overrides_limits_and_schemas() {
        let json = r#"{
            "maxFileSize": 1024,
            "allowedExtensions": [".CSV"],
            "processingTimeoutMs": 250,
            "schemas": [{
                "documentType": "osr",
                "displayName": "OSR",
                "sheets": [{
                    "canonicalName": "Orders",
                    "documentType": "osr",
                    "requiredColumns": [
                        {"canonicalName": "Order", "valueType": "string", "required": true,
                         "validationRules": [{"rule": {"kind": "minLength", "value": 1}, "message": "empty"}]}
                    ]
                }]
            }]
        }"#;
        let config = ProcessorConfig::from_json_str(json).unwrap();
        assert_eq!(config.max_file_size, 1024);
        assert_eq!(config.processing_timeout, Duration::from_millis(250));
        assert_eq!(config.allowed_extensions, vec!["csv".to_string()]);
        assert!(!config.is_extension_allowed("xlsx"));
        assert!(config.registry.get_schema(DocumentType::Inventory).is_err());
        let osr = config.registry.get_schema(DocumentType::Osr).unwrap();
        assert_eq!(osr.sheets[0].aliases, vec!["Orders".to_string()]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = ProcessorConfig::from_json_str(r#"{"maxFileSzie": 3}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }
}
