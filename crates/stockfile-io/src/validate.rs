//! Structural validation of decoded workbooks against document schemas.
//!
//! Validation never fails outright: every problem becomes either a fatal
//! [`ValidationError`] (which flips [`ValidationResult::is_valid`]) or a warning string.
//! Warnings are aggregated so that one bad column in a 10k row sheet produces one line, not
//! 10k.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use stockfile_model::{
    names, CellValue, ColumnSchema, DocumentSchema, DocumentType, ParsedSheet, Row, RuleKind,
    SchemaRegistry, SheetSchema, ValueType,
};

use crate::decode::{RawSheet, RawWorkbook};

/// How many row numbers an aggregated message lists before summarizing the rest.
const MAX_LISTED_ROWS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    MissingSheet,
    MissingColumn,
    InvalidData,
}

impl ValidationErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationErrorKind::MissingSheet => "missing_sheet",
            ValidationErrorKind::MissingColumn => "missing_column",
            ValidationErrorKind::InvalidData => "invalid_data",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal structural problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// 1-based workbook row of the first offending cell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    pub message: String,
}

impl ValidationError {
    pub fn missing_sheet(sheet: &SheetSchema, document_type: DocumentType) -> Self {
        Self {
            kind: ValidationErrorKind::MissingSheet,
            sheet: Some(sheet.canonical_name.clone()),
            column: None,
            row: None,
            message: format!(
                "Required sheet '{}' not found for {document_type} workbook (accepted names: {})",
                sheet.canonical_name,
                sheet.aliases.join(", ")
            ),
        }
    }

    pub fn missing_column(sheet_name: &str, column: &ColumnSchema) -> Self {
        Self {
            kind: ValidationErrorKind::MissingColumn,
            sheet: Some(sheet_name.to_string()),
            column: Some(column.canonical_name.clone()),
            row: None,
            message: format!(
                "Required column '{}' not found in sheet '{sheet_name}'",
                column.canonical_name
            ),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
    /// Workbook names of the sheets that matched a schema sheet.
    pub sheets_found: Vec<String>,
    pub rows_processed: usize,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            sheets_found: Vec::new(),
            rows_processed: 0,
        }
    }
}

impl ValidationResult {
    pub fn push_error(&mut self, error: ValidationError) {
        self.is_valid = false;
        self.errors.push(error);
    }

    /// Combine with the result of another schema pass; valid only if both are.
    pub fn merge(&mut self, other: ValidationResult) {
        self.is_valid &= other.is_valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        for sheet in other.sheets_found {
            if !self.sheets_found.contains(&sheet) {
                self.sheets_found.push(sheet);
            }
        }
        self.rows_processed += other.rows_processed;
    }

    pub fn first_error_of(&self, kind: ValidationErrorKind) -> Option<&ValidationError> {
        self.errors.iter().find(|error| error.kind == kind)
    }

    pub fn has_error_of(&self, kind: ValidationErrorKind) -> bool {
        self.first_error_of(kind).is_some()
    }
}

/// The outcome of validating a workbook against one document schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaValidation {
    pub document_type: DocumentType,
    pub result: ValidationResult,
    /// Matched sheets projected onto their schema columns, in schema order.
    pub sheets: Vec<ParsedSheet>,
    /// Workbook indices of the matched sheets, parallel to `sheets`.
    pub sheet_indices: Vec<usize>,
}

/// Validate `workbook` against a single schema.
pub fn validate(workbook: &RawWorkbook, schema: &DocumentSchema) -> SchemaValidation {
    let mut validation = match validate_schema(workbook, schema, |_| Ok::<(), Infallible>(())) {
        Ok(validation) => validation,
        Err(never) => match never {},
    };
    if let Some(warning) = extra_sheets_warning(workbook, &validation.sheet_indices) {
        validation.result.warnings.push(warning);
    }
    validation
}

/// Like [`validate`], but calls `before_sheet` with each matched workbook sheet name before
/// that sheet is checked. An error from the hook aborts validation. The extra-sheet warning is
/// not produced here; see [`extra_sheets_warning`].
pub fn validate_schema<E>(
    workbook: &RawWorkbook,
    schema: &DocumentSchema,
    mut before_sheet: impl FnMut(&str) -> Result<(), E>,
) -> Result<SchemaValidation, E> {
    let mut result = ValidationResult::default();
    let mut sheets = Vec::new();
    let mut regexes = RegexCache::default();
    let mut claimed: Vec<usize> = Vec::new();

    for sheet_schema in &schema.sheets {
        let Some(index) = find_sheet(workbook, sheet_schema, &claimed) else {
            if !sheet_schema.optional {
                result.push_error(ValidationError::missing_sheet(
                    sheet_schema,
                    schema.document_type,
                ));
            }
            continue;
        };
        claimed.push(index);
        let raw = &workbook.sheets[index];
        before_sheet(&raw.name)?;

        let parsed = validate_sheet(raw, sheet_schema, &mut regexes, &mut result);
        result.sheets_found.push(raw.name.clone());
        result.rows_processed += parsed.row_count;
        result.warnings.extend(parsed.warnings.iter().cloned());
        sheets.push(parsed);
    }

    Ok(SchemaValidation {
        document_type: schema.document_type,
        result,
        sheets,
        sheet_indices: claimed,
    })
}

const EXTRA_SHEETS_PREFIX: &str = "Extra sheets ignored";

/// One warning naming every workbook sheet whose index is not in `claimed`.
///
/// A sheet whose name matches a schema sheet that another workbook sheet already satisfied is
/// extra too.
pub fn extra_sheets_warning(workbook: &RawWorkbook, claimed: &[usize]) -> Option<String> {
    let extra: Vec<&str> = workbook
        .sheets
        .iter()
        .enumerate()
        .filter(|(index, _)| !claimed.contains(index))
        .map(|(_, sheet)| sheet.name.as_str())
        .collect();
    if extra.is_empty() {
        None
    } else {
        Some(format!("{EXTRA_SHEETS_PREFIX}: {}", extra.join(", ")))
    }
}

/// Workbook indices `schema` would claim, one per schema sheet, without validating them.
pub fn claimed_sheet_indices(workbook: &RawWorkbook, schema: &DocumentSchema) -> Vec<usize> {
    let mut claimed = Vec::new();
    for sheet_schema in &schema.sheets {
        if let Some(index) = find_sheet(workbook, sheet_schema, &claimed) {
            claimed.push(index);
        }
    }
    claimed
}

/// Document types whose non-optional sheets are all present in `workbook`.
pub fn detect_document_types(
    workbook: &RawWorkbook,
    registry: &SchemaRegistry,
) -> Vec<DocumentType> {
    registry
        .schemas()
        .filter(|schema| is_detected(workbook, schema))
        .map(|schema| schema.document_type)
        .collect()
}

/// The first required schema sheet whose required columns all appear in `sheet`'s header.
///
/// Used for single-sheet sources such as CSV files, whose sheet name is just the file name.
pub fn match_sheet_by_columns<'r>(
    sheet: &RawSheet,
    registry: &'r SchemaRegistry,
) -> Option<&'r SheetSchema> {
    let header: Vec<String> = sheet
        .header_row_index()
        .map(|index| sheet.cells[index].iter().map(|cell| cell.to_string()).collect())?;
    registry
        .schemas()
        .flat_map(|schema| schema.required_sheets())
        .find(|candidate| {
            let mut required = candidate.required_columns.iter().filter(|c| c.required).peekable();
            required.peek().is_some()
                && required.all(|column| header.iter().any(|text| column.matches(text)))
        })
}

fn is_detected(workbook: &RawWorkbook, schema: &DocumentSchema) -> bool {
    let mut any_matched = false;
    for sheet in &schema.sheets {
        let present = workbook.sheet_names().any(|name| sheet.matches(name));
        if !present && !sheet.optional {
            return false;
        }
        any_matched |= present;
    }
    any_matched
}

fn find_sheet(
    workbook: &RawWorkbook,
    sheet_schema: &SheetSchema,
    claimed: &[usize],
) -> Option<usize> {
    workbook
        .sheets
        .iter()
        .enumerate()
        .find(|(index, raw)| !claimed.contains(index) && sheet_schema.matches(&raw.name))
        .map(|(index, _)| index)
}

#[derive(Default)]
struct RegexCache {
    compiled: HashMap<String, Option<Regex>>,
}

impl RegexCache {
    fn get(&mut self, pattern: &str) -> Option<&Regex> {
        self.compiled
            .entry(pattern.to_string())
            .or_insert_with(|| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(err) => {
                    log::warn!("skipping invalid validation regex `{pattern}`: {err}");
                    None
                }
            })
            .as_ref()
    }
}

/// Failing workbook rows keyed by (column index, rule index).
type RuleFailures = BTreeMap<(usize, usize), Vec<usize>>;

fn validate_sheet(
    raw: &RawSheet,
    schema: &SheetSchema,
    regexes: &mut RegexCache,
    result: &mut ValidationResult,
) -> ParsedSheet {
    let mut warnings = Vec::new();
    let Some(header_index) = raw.header_row_index() else {
        for column in schema.required_columns.iter().filter(|c| c.required) {
            result.push_error(ValidationError::missing_column(&raw.name, column));
        }
        warnings.push(format!("Sheet '{}' is empty", raw.name));
        return ParsedSheet::new(
            &raw.name,
            schema.document_type,
            Vec::new(),
            Vec::new(),
            warnings,
        );
    };
    let header = &raw.cells[header_index];
    let header_text: Vec<String> = header.iter().map(|cell| cell.to_string()).collect();

    // Resolve each schema column to a header position; first matching header cell wins.
    let mut used = vec![false; header.len()];
    let mut resolved: Vec<(&ColumnSchema, usize)> = Vec::new();
    for column in &schema.required_columns {
        let position = header_text
            .iter()
            .enumerate()
            .find(|(index, text)| !used[*index] && column.matches(text))
            .map(|(index, _)| index);
        match position {
            Some(index) => {
                used[index] = true;
                resolved.push((column, index));
            }
            None if column.required => {
                result.push_error(ValidationError::missing_column(&raw.name, column));
            }
            None => {}
        }
    }

    let extra: Vec<&str> = header_text
        .iter()
        .enumerate()
        .filter(|(index, text)| !used[*index] && !names::normalize_name(text).is_empty())
        .map(|(_, text)| text.as_str())
        .collect();
    if !extra.is_empty() {
        warnings.push(format!(
            "Extra columns ignored in sheet '{}': {}",
            raw.name,
            extra.join(", ")
        ));
    }

    let mut rows = Vec::new();
    let mut rule_failures = RuleFailures::new();
    let mut type_failures: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut empty_required: BTreeMap<usize, Vec<usize>> = BTreeMap::new();

    for (offset, cells) in raw.cells.iter().enumerate().skip(header_index + 1) {
        if cells.iter().all(CellValue::is_empty) {
            continue;
        }
        let row_number = offset + 1;
        let mut row = Row::new();
        for (column_index, (column, position)) in resolved.iter().enumerate() {
            let raw_value = cells.get(*position).cloned().unwrap_or_default();
            if raw_value.is_empty() {
                if column.required && !column.validation_rules.is_empty() {
                    empty_required.entry(column_index).or_default().push(row_number);
                }
                row.insert(column.canonical_name.clone(), CellValue::Empty);
                continue;
            }

            let value = match raw_value.coerce(column.value_type) {
                Ok(value) => value,
                Err(original) => {
                    type_failures.entry(column_index).or_default().push(row_number);
                    original
                }
            };
            for (rule_index, rule) in column.validation_rules.iter().enumerate() {
                let regex = match &rule.rule {
                    RuleKind::Regex(pattern) => regexes.get(pattern),
                    _ => None,
                };
                if !rule.check(&value, regex) {
                    rule_failures
                        .entry((column_index, rule_index))
                        .or_default()
                        .push(row_number);
                }
            }
            row.insert(column.canonical_name.clone(), value);
        }
        rows.push(row);
    }

    for (column_index, failed_rows) in &empty_required {
        let column = resolved[*column_index].0;
        result.push_error(ValidationError {
            kind: ValidationErrorKind::InvalidData,
            sheet: Some(raw.name.clone()),
            column: Some(column.canonical_name.clone()),
            row: failed_rows.first().copied(),
            message: format!(
                "Required column '{}' in sheet '{}' is empty in {}",
                column.canonical_name,
                raw.name,
                describe_rows(failed_rows)
            ),
        });
    }
    for (column_index, failed_rows) in &type_failures {
        let column = resolved[*column_index].0;
        warnings.push(format!(
            "Column '{}' in sheet '{}' has values that are not {} in {}",
            column.canonical_name,
            raw.name,
            describe_type(column.value_type),
            describe_rows(failed_rows)
        ));
    }
    for ((column_index, rule_index), failed_rows) in &rule_failures {
        let column = resolved[*column_index].0;
        let rule = &column.validation_rules[*rule_index];
        warnings.push(format!(
            "{} (sheet '{}', column '{}', {} rule) in {}",
            rule.message,
            raw.name,
            column.canonical_name,
            rule.rule.name(),
            describe_rows(failed_rows)
        ));
    }

    // `resolved` follows schema order, so the output columns do too.
    let columns = resolved
        .iter()
        .map(|(column, _)| column.canonical_name.clone())
        .collect();
    ParsedSheet::new(&raw.name, schema.document_type, columns, rows, warnings)
}

fn describe_type(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::String => "text",
        ValueType::Number => "numbers",
        ValueType::Date => "dates",
    }
}

fn describe_rows(rows: &[usize]) -> String {
    let listed: Vec<String> = rows
        .iter()
        .take(MAX_LISTED_ROWS)
        .map(|row| row.to_string())
        .collect();
    let noun = if rows.len() == 1 { "row" } else { "rows" };
    let mut out = format!("{noun} {}", listed.join(", "));
    if rows.len() > MAX_LISTED_ROWS {
        out.push_str(&format!(" and {} more", rows.len() - MAX_LISTED_ROWS));
    }
    out
}
