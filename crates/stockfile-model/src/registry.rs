use std::collections::BTreeMap;

use regex::Regex;
use thiserror::Error;

use crate::builtin::builtin_schemas;
use crate::document::{DocumentType, UnknownDocumentType};
use crate::schema::{DocumentSchema, RuleKind};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("document type `{0}` is configured more than once")]
    DuplicateDocumentType(DocumentType),
    #[error("document type `{0}` has no sheets")]
    NoSheets(DocumentType),
    #[error("a sheet of document type `{0}` has an empty canonical name")]
    EmptySheetName(DocumentType),
    #[error("sheet `{sheet}` has a column with an empty canonical name")]
    EmptyColumnName { sheet: String },
    #[error("invalid regex for column `{column}` in sheet `{sheet}`: {source}")]
    InvalidRegex {
        sheet: String,
        column: String,
        #[source]
        source: regex::Error,
    },
    #[error("column `{column}` in sheet `{sheet}` has contradictory `{rule}` bounds")]
    ContradictoryBounds {
        sheet: String,
        column: String,
        rule: &'static str,
    },
    #[error("sheet `{sheet}` is declared under `{declared}` but belongs to `{found}`")]
    MismatchedSheetType {
        sheet: String,
        declared: DocumentType,
        found: DocumentType,
    },
}

/// Static, per-document-type schema configuration.
///
/// The registry is fixed at construction; lookups never mutate it.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: BTreeMap<DocumentType, DocumentSchema>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SchemaRegistry {
    /// Registry with the built-in inventory and OSR schemas.
    pub fn builtin() -> Self {
        match Self::new(builtin_schemas()) {
            Ok(registry) => registry,
            // The built-in tables are covered by tests; reaching this is a programming error.
            Err(err) => panic!("built-in schemas are invalid: {err}"),
        }
    }

    pub fn new(schemas: impl IntoIterator<Item = DocumentSchema>) -> Result<Self, SchemaError> {
        let mut out = BTreeMap::new();
        for mut schema in schemas {
            check_schema(&schema)?;
            for sheet in &mut schema.sheets {
                sheet.normalize_aliases();
            }
            let document_type = schema.document_type;
            if out.insert(document_type, schema).is_some() {
                return Err(SchemaError::DuplicateDocumentType(document_type));
            }
        }
        Ok(Self { schemas: out })
    }

    pub fn get_schema(
        &self,
        document_type: DocumentType,
    ) -> Result<&DocumentSchema, UnknownDocumentType> {
        self.schemas
            .get(&document_type)
            .ok_or_else(|| UnknownDocumentType(document_type.to_string()))
    }

    /// Look up a schema by its textual document type (`"inventory"`, `"OSR"`).
    pub fn get_schema_by_name(&self, name: &str) -> Result<&DocumentSchema, UnknownDocumentType> {
        let document_type: DocumentType = name.parse()?;
        self.get_schema(document_type)
    }

    pub fn document_types(&self) -> impl Iterator<Item = DocumentType> + '_ {
        self.schemas.keys().copied()
    }

    pub fn schemas(&self) -> impl Iterator<Item = &DocumentSchema> {
        self.schemas.values()
    }
}

fn check_schema(schema: &DocumentSchema) -> Result<(), SchemaError> {
    if schema.sheets.is_empty() {
        return Err(SchemaError::NoSheets(schema.document_type));
    }
    for sheet in &schema.sheets {
        if sheet.canonical_name.trim().is_empty() {
            return Err(SchemaError::EmptySheetName(schema.document_type));
        }
        if sheet.document_type != schema.document_type {
            return Err(SchemaError::MismatchedSheetType {
                sheet: sheet.canonical_name.clone(),
                declared: schema.document_type,
                found: sheet.document_type,
            });
        }
        for column in &sheet.required_columns {
            if column.canonical_name.trim().is_empty() {
                return Err(SchemaError::EmptyColumnName {
                    sheet: sheet.canonical_name.clone(),
                });
            }

            let mut min = None;
            let mut max = None;
            let mut min_len = None;
            let mut max_len = None;
            for rule in &column.validation_rules {
                match &rule.rule {
                    RuleKind::Regex(pattern) => {
                        Regex::new(pattern).map_err(|source| SchemaError::InvalidRegex {
                            sheet: sheet.canonical_name.clone(),
                            column: column.canonical_name.clone(),
                            source,
                        })?;
                    }
                    RuleKind::Min(v) => min = Some(*v),
                    RuleKind::Max(v) => max = Some(*v),
                    RuleKind::MinLength(v) => min_len = Some(*v),
                    RuleKind::MaxLength(v) => max_len = Some(*v),
                    RuleKind::OneOf(_) => {}
                }
            }
            let contradiction = match (min, max, min_len, max_len) {
                (Some(lo), Some(hi), _, _) if lo > hi => Some("min/max"),
                (_, _, Some(lo), Some(hi)) if lo > hi => Some("minLength/maxLength"),
                _ => None,
            };
            if let Some(rule) = contradiction {
                return Err(SchemaError::ContradictoryBounds {
                    sheet: sheet.canonical_name.clone(),
                    column: column.canonical_name.clone(),
                    rule,
                });
            }
        }
    }
    Ok(())
}
