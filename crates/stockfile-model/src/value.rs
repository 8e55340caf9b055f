use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::schema::ValueType;

/// JSON-friendly representation of one cell.
///
/// The enum uses an explicit `{type, value}` tagged layout so persisted rows
/// round-trip without guessing (a date and its ISO string stay distinct).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDate),
}

impl CellValue {
    /// Empty cells and whitespace-only text both count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Coerce a raw cell into the representation a schema column expects.
    ///
    /// Returns `Err(original)` when the value cannot be represented as `target`;
    /// callers keep the original value and report a type warning.
    pub fn coerce(self, target: ValueType) -> Result<CellValue, CellValue> {
        if self.is_empty() {
            return Ok(CellValue::Empty);
        }
        match target {
            ValueType::String => Ok(match self {
                CellValue::Text(s) => CellValue::Text(s.trim().to_string()),
                other => CellValue::Text(other.to_string()),
            }),
            ValueType::Number => match self {
                CellValue::Number(n) => Ok(CellValue::Number(n)),
                CellValue::Text(s) => match parse_number(&s) {
                    Some(n) => Ok(CellValue::Number(n)),
                    None => Err(CellValue::Text(s)),
                },
                other => Err(other),
            },
            ValueType::Date => match self {
                CellValue::Date(d) => Ok(CellValue::Date(d)),
                CellValue::Number(serial) => {
                    excel_serial_to_date(serial)
                        .map(CellValue::Date)
                        .ok_or(CellValue::Number(serial))
                }
                CellValue::Text(s) => match parse_date(&s) {
                    Some(d) => Ok(CellValue::Date(d)),
                    None => Err(CellValue::Text(s)),
                },
                other => Err(other),
            },
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            CellValue::Boolean(true) => f.write_str("TRUE"),
            CellValue::Boolean(false) => f.write_str("FALSE"),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '₹'];

/// Parse user-entered numeric text such as `1,234.50`, `(12)`, `₹ 300` or `15%`.
pub fn parse_number(text: &str) -> Option<f64> {
    let mut s = text.trim();
    let mut negative = false;
    if let Some(inner) = s.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')) {
        negative = true;
        s = inner.trim();
    }
    let (s, percent) = match s.strip_suffix('%') {
        Some(rest) => (rest.trim_end(), true),
        None => (s, false),
    };
    let s = s.trim_start_matches(CURRENCY_SYMBOLS).trim();
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let cleaned = strip_group_separators(&compact)?;
    if cleaned.is_empty() {
        return None;
    }
    let mut value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    if percent {
        value /= 100.0;
    }
    if negative {
        value = -value;
    }
    Some(value)
}

/// Remove thousands separators from the integer part of `s`.
///
/// The last group must have three digits. Inner groups are all three digits (`1,234,567`) or
/// all two digits (lakh grouping, `12,34,567`). Any other comma placement, such as the
/// decimal comma in `1,5`, makes the text unparseable.
fn strip_group_separators(s: &str) -> Option<String> {
    if !s.contains(',') {
        return Some(s.to_string());
    }
    let (int_part, fraction) = match s.split_once('.') {
        Some((int_part, fraction)) => (int_part, Some(fraction)),
        None => (s, None),
    };
    if fraction.is_some_and(|f| f.contains(',')) {
        return None;
    }
    let digits = int_part.trim_start_matches(['-', '+']);
    let sign = &int_part[..int_part.len() - digits.len()];
    fn all_digits(group: &str) -> bool {
        group.bytes().all(|b| b.is_ascii_digit())
    }

    let groups: Vec<&str> = digits.split(',').collect();
    let (first, rest) = groups.split_first()?;
    let (last, inner) = rest.split_last()?;
    let inner_width = inner.first().map_or(3, |group| group.len());
    let well_formed = (1..=3).contains(&first.len())
        && all_digits(first)
        && last.len() == 3
        && all_digits(last)
        && (inner_width == 2 || inner_width == 3)
        && inner.iter().all(|group| group.len() == inner_width && all_digits(group));
    if !well_formed {
        return None;
    }
    let mut out = format!("{sign}{}", groups.concat());
    if let Some(fraction) = fraction {
        out.push('.');
        out.push_str(fraction);
    }
    Some(out)
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d"];

/// Parse the date spellings commonly found in exported reports.
///
/// Slash-separated dates are read day-first (`03/04/2024` is 3 April).
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let s = text.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.date());
        }
    }
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Largest serial Excel accepts (9999-12-31).
const EXCEL_MAX_SERIAL: f64 = 2_958_465.0;

/// Convert an Excel 1900-system serial date to a calendar date.
///
/// Serial 60 is Excel's phantom 1900-02-29; serials above it are shifted by one
/// day to compensate for the Lotus leap-year bug.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > EXCEL_MAX_SERIAL {
        return None;
    }
    let days = serial.floor() as i64;
    let base = if days < 60 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    base.checked_add_signed(Duration::days(days))
}
