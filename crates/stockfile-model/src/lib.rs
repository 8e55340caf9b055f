//! `stockfile-model` holds the data shared by the ingestion engine and the
//! storage layer:
//! - document types and the declarative sheet/column schemas (with aliases and rules)
//! - the built-in inventory and OSR schema registry
//! - cell values and their coercion to schema column types
//! - parsed sheets and processed documents
//! - processor configuration (limits + schemas)
//!
//! Everything here is plain data; no IO happens in this crate apart from
//! reading a config file on request.

mod builtin;
pub mod config;
mod document;
pub mod names;
mod registry;
mod schema;
mod value;

pub use builtin::{builtin_schemas, inventory_schema, osr_schema};
pub use config::{ConfigError, ProcessorConfig};
pub use document::{
    DocumentType, ParsedSheet, ProcessedDocument, ProcessingStats, Row, UnknownDocumentType,
};
pub use registry::{SchemaError, SchemaRegistry};
pub use schema::{
    ColumnSchema, DocumentSchema, RuleKind, SheetSchema, ValidationRule, ValueType,
};
pub use value::{excel_serial_to_date, parse_date, parse_number, CellValue};
