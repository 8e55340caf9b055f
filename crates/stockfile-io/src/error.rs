use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decode::DecodeError;
use crate::validate::{ValidationError, ValidationErrorKind, ValidationResult};

/// Category of a failed processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Validation,
    Parsing,
    Timeout,
    Size,
    Format,
    Sheets,
    Columns,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Parsing => "parsing",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Size => "size",
            ErrorKind::Format => "format",
            ErrorKind::Sheets => "sheets",
            ErrorKind::Columns => "columns",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recoverable processing failure, returned as a value.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{kind} error: {message}")]
pub struct ProcessingError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Every structural error behind a validation failure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ValidationError>,
}

impl ProcessingError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sheet: None,
            column: None,
            details: Vec::new(),
        }
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    pub fn size(size: u64, limit: u64) -> Self {
        Self::new(
            ErrorKind::Size,
            format!("File is {size} bytes, which exceeds the {limit} byte limit"),
        )
    }

    pub fn format(extension: &str, allowed: &[String]) -> Self {
        let shown = if extension.is_empty() { "(none)" } else { extension };
        Self::new(
            ErrorKind::Format,
            format!(
                "Unsupported file extension `{shown}`; expected one of: {}",
                allowed.join(", ")
            ),
        )
    }

    pub fn timeout(limit_ms: u128) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("Processing exceeded the {limit_ms} ms timeout"),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Processing was cancelled")
    }

    pub fn no_document_type(known: &[String]) -> Self {
        Self::new(
            ErrorKind::Sheets,
            format!(
                "No sheets matched any known document type ({})",
                known.join(", ")
            ),
        )
    }

    /// Map a failed validation to `columns`, `sheets` or `validation`, in that priority.
    pub fn from_validation(result: &ValidationResult) -> Self {
        let missing_column = result.first_error_of(ValidationErrorKind::MissingColumn);
        let (kind, first) = if let Some(err) = missing_column {
            (ErrorKind::Columns, Some(err))
        } else if let Some(err) = result.first_error_of(ValidationErrorKind::MissingSheet) {
            (ErrorKind::Sheets, Some(err))
        } else {
            (ErrorKind::Validation, result.errors.first())
        };
        let message = match first {
            Some(err) if result.errors.len() > 1 => {
                format!("{} (and {} more)", err.message, result.errors.len() - 1)
            }
            Some(err) => err.message.clone(),
            None => "Validation failed".to_string(),
        };
        Self {
            kind,
            message,
            sheet: first.and_then(|err| err.sheet.clone()),
            column: first.and_then(|err| err.column.clone()),
            details: result.errors.clone(),
        }
    }
}

impl From<DecodeError> for ProcessingError {
    fn from(err: DecodeError) -> Self {
        let sheet = match &err {
            DecodeError::Sheet { sheet, .. } => Some(sheet.clone()),
            _ => None,
        };
        Self {
            sheet,
            ..Self::new(ErrorKind::Parsing, format!("Failed to parse file: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(kind: ValidationErrorKind, sheet: &str, column: Option<&str>) -> ValidationError {
        ValidationError {
            kind,
            sheet: Some(sheet.to_string()),
            column: column.map(str::to_string),
            row: None,
            message: format!("{kind} in {sheet}"),
        }
    }

    #[test]
    fn missing_columns_take_priority() {
        let mut result = ValidationResult::default();
        result.push_error(error(ValidationErrorKind::MissingSheet, "RPM", None));
        result.push_error(error(ValidationErrorKind::MissingColumn, "FG Value", Some("Stock")));

        let err = ProcessingError::from_validation(&result);
        assert_eq!(err.kind, ErrorKind::Columns);
        assert_eq!(err.sheet.as_deref(), Some("FG Value"));
        assert_eq!(err.column.as_deref(), Some("Stock"));
        assert_eq!(err.details.len(), 2);
        assert_eq!(err.message, "missing_column in FG Value (and 1 more)");
    }

    #[test]
    fn invalid_data_maps_to_validation() {
        let mut result = ValidationResult::default();
        result.push_error(error(ValidationErrorKind::InvalidData, "FG Value", Some("Material")));
        assert_eq!(ProcessingError::from_validation(&result).kind, ErrorKind::Validation);
    }

    #[test]
    fn serializes_kind_lowercase() {
        let json = serde_json::to_value(ProcessingError::timeout(5)).unwrap();
        assert_eq!(json["kind"], "timeout");
        assert!(json.get("details").is_none());
        assert_eq!(
            ProcessingError::cancelled().to_string(),
            "cancelled error: Processing was cancelled"
        );
    }
}
