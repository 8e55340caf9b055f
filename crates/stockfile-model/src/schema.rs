use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::DocumentType;
use crate::names::{matches_any, names_match};
use crate::value::CellValue;

/// Target representation of a schema column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Date,
}

/// The comparison a [`ValidationRule`] performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum RuleKind {
    MinLength(usize),
    MaxLength(usize),
    Min(f64),
    Max(f64),
    Regex(String),
    OneOf(Vec<String>),
}

impl RuleKind {
    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::MinLength(_) => "minLength",
            RuleKind::MaxLength(_) => "maxLength",
            RuleKind::Min(_) => "min",
            RuleKind::Max(_) => "max",
            RuleKind::Regex(_) => "regex",
            RuleKind::OneOf(_) => "oneOf",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub rule: RuleKind,
    /// Human readable explanation shown when the rule fails.
    pub message: String,
}

impl ValidationRule {
    pub fn new(rule: RuleKind, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
        }
    }

    /// Check a non-empty, already coerced value.
    ///
    /// `regex` must be the compiled form of a [`RuleKind::Regex`] pattern; it is
    /// ignored for other rule kinds. Numeric bounds only constrain numbers, so a
    /// text value in a number column is left to the type check.
    pub fn check(&self, value: &CellValue, regex: Option<&Regex>) -> bool {
        match &self.rule {
            RuleKind::MinLength(min) => value.to_string().chars().count() >= *min,
            RuleKind::MaxLength(max) => value.to_string().chars().count() <= *max,
            RuleKind::Min(min) => value.as_number().map_or(true, |n| n >= *min),
            RuleKind::Max(max) => value.as_number().map_or(true, |n| n <= *max),
            RuleKind::Regex(_) => regex.map_or(true, |re| re.is_match(&value.to_string())),
            RuleKind::OneOf(allowed) => {
                let text = value.to_string();
                allowed.iter().any(|candidate| names_match(candidate, &text))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub canonical_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub value_type: ValueType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub validation_rules: Vec<ValidationRule>,
}

impl ColumnSchema {
    pub fn new(canonical_name: impl Into<String>, value_type: ValueType) -> Self {
        let canonical_name = canonical_name.into();
        Self {
            aliases: vec![canonical_name.clone()],
            canonical_name,
            value_type,
            required: false,
            validation_rules: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn rule(mut self, rule: RuleKind, message: impl Into<String>) -> Self {
        self.validation_rules.push(ValidationRule::new(rule, message));
        self
    }

    pub fn matches(&self, header: &str) -> bool {
        matches_any(header, &self.aliases)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSchema {
    pub canonical_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub document_type: DocumentType,
    pub required_columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub optional: bool,
}

impl SheetSchema {
    pub fn new(canonical_name: impl Into<String>, document_type: DocumentType) -> Self {
        let canonical_name = canonical_name.into();
        Self {
            aliases: vec![canonical_name.clone()],
            canonical_name,
            document_type,
            required_columns: Vec::new(),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn column(mut self, column: ColumnSchema) -> Self {
        self.required_columns.push(column);
        self
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = ColumnSchema>) -> Self {
        self.required_columns.extend(columns);
        self
    }

    pub fn matches(&self, sheet_name: &str) -> bool {
        matches_any(sheet_name, &self.aliases)
    }

    /// Ensure the canonical name is one of the aliases.
    pub(crate) fn normalize_aliases(&mut self) {
        if !self.matches(&self.canonical_name) {
            self.aliases.insert(0, self.canonical_name.clone());
        }
        for column in &mut self.required_columns {
            if !column.matches(&column.canonical_name) {
                column.aliases.insert(0, column.canonical_name.clone());
            }
        }
    }
}

/// Everything the validator needs to know about one document type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSchema {
    pub document_type: DocumentType,
    pub display_name: String,
    pub sheets: Vec<SheetSchema>,
}

impl DocumentSchema {
    pub fn new(document_type: DocumentType, display_name: impl Into<String>) -> Self {
        Self {
            document_type,
            display_name: display_name.into(),
            sheets: Vec::new(),
        }
    }

    pub fn sheet(mut self, sheet: SheetSchema) -> Self {
        self.sheets.push(sheet);
        self
    }

    /// Sheets that must be present for a workbook to count as this document type.
    pub fn required_sheets(&self) -> impl Iterator<Item = &SheetSchema> {
        self.sheets.iter().filter(|sheet| !sheet.optional)
    }
}
