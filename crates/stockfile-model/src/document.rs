use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::CellValue;

/// The business document families the ingestion engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// Finished-goods / raw-material stock valuation workbooks.
    Inventory,
    /// Open sales order reports.
    Osr,
}

impl DocumentType {
    pub const ALL: [DocumentType; 2] = [DocumentType::Inventory, DocumentType::Osr];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Inventory => "inventory",
            DocumentType::Osr => "osr",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown document type `{0}`")]
pub struct UnknownDocumentType(pub String);

impl FromStr for DocumentType {
    type Err = UnknownDocumentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inventory" => Ok(DocumentType::Inventory),
            "osr" => Ok(DocumentType::Osr),
            _ => Err(UnknownDocumentType(s.to_string())),
        }
    }
}

/// One data row keyed by canonical column name.
pub type Row = BTreeMap<String, CellValue>;

/// A sheet that matched a [`crate::SheetSchema`], projected onto the schema's columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedSheet {
    /// Sheet name as it appears in the source workbook.
    pub name: String,
    pub document_type: DocumentType,
    pub row_count: usize,
    pub column_count: usize,
    /// Canonical column names in schema order.
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ParsedSheet {
    pub fn new(
        name: impl Into<String>,
        document_type: DocumentType,
        columns: Vec<String>,
        rows: Vec<Row>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            document_type,
            row_count: rows.len(),
            column_count: columns.len(),
            columns,
            rows,
            warnings,
        }
    }
}

/// The result of a successful ingestion, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedDocument {
    pub file_name: String,
    pub file_size: u64,
    pub processed_at: DateTime<Utc>,
    pub sheets: Vec<ParsedSheet>,
    pub detected_document_types: Vec<DocumentType>,
}

impl ProcessedDocument {
    /// Sheets belonging to `document_type`, in workbook order.
    pub fn sheets_of(&self, document_type: DocumentType) -> impl Iterator<Item = &ParsedSheet> {
        self.sheets
            .iter()
            .filter(move |sheet| sheet.document_type == document_type)
    }

    pub fn total_rows(&self) -> usize {
        self.sheets.iter().map(|sheet| sheet.row_count).sum()
    }

    pub fn is_detected_as(&self, document_type: DocumentType) -> bool {
        self.detected_document_types.contains(&document_type)
    }
}

/// Counters describing one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStats {
    pub processing_time_ms: u64,
    pub total_rows: usize,
    pub total_sheets: usize,
    pub total_columns: usize,
    pub warning_count: usize,
}
