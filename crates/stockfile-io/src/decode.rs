use std::borrow::Cow;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader, Sheets};
use encoding_rs::WINDOWS_1252;
use stockfile_model::{excel_serial_to_date, parse_date, CellValue};
use thiserror::Error;

use crate::format::{sniff_container, Container, WorkbookFormat};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("file content is not a valid `.{format}` workbook")]
    UnexpectedContainer { format: WorkbookFormat },
    #[error("failed to read workbook: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("failed to read sheet `{sheet}`: {source}")]
    Sheet {
        sheet: String,
        #[source]
        source: calamine::Error,
    },
    #[error("failed to read csv: {0}")]
    Csv(#[from] csv::Error),
}

/// A sheet as decoded from the workbook: a name plus a 2-D grid of cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSheet {
    pub name: String,
    pub cells: Vec<Vec<CellValue>>,
}

impl RawSheet {
    pub fn new(name: impl Into<String>, cells: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    /// Index of the first row with at least one non-empty cell.
    pub fn header_row_index(&self) -> Option<usize> {
        self.cells
            .iter()
            .position(|row| row.iter().any(|cell| !cell.is_empty()))
    }

    pub fn row_count(&self) -> usize {
        self.cells.len()
    }
}

/// All sheets of a decoded workbook, in workbook order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawWorkbook {
    pub sheets: Vec<RawSheet>,
}

impl RawWorkbook {
    pub fn new(sheets: Vec<RawSheet>) -> Self {
        Self { sheets }
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|sheet| sheet.name.as_str())
    }
}

/// An opened workbook whose sheets can be read one at a time.
///
/// Opening parses the container (shared strings, workbook part) exactly once;
/// [`WorkbookDecoder::read_sheet`] then materializes individual sheets so the
/// pipeline can report progress and honour its deadline between them.
pub enum WorkbookDecoder {
    Spreadsheet {
        workbook: Sheets<Cursor<Vec<u8>>>,
        names: Vec<String>,
    },
    Csv(Option<RawSheet>),
}

impl std::fmt::Debug for WorkbookDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkbookDecoder::Spreadsheet { names, .. } => {
                f.debug_struct("Spreadsheet").field("names", names).finish()
            }
            WorkbookDecoder::Csv(sheet) => f.debug_tuple("Csv").field(sheet).finish(),
        }
    }
}

impl WorkbookDecoder {
    /// `sheet_name` names the single sheet produced for CSV input.
    pub fn open(
        bytes: &[u8],
        format: WorkbookFormat,
        sheet_name: &str,
    ) -> Result<Self, DecodeError> {
        if let Some(expected) = format.expected_container() {
            let found = sniff_container(bytes);
            // Legacy `.xls` is always CFB; encrypted OOXML also arrives wrapped in CFB and is
            // rejected by calamine with a descriptive error.
            let acceptable =
                found == expected || (found == Container::Cfb && expected == Container::Zip);
            if !acceptable {
                return Err(DecodeError::UnexpectedContainer { format });
            }
        }

        if format == WorkbookFormat::Csv {
            return Ok(WorkbookDecoder::Csv(Some(decode_csv(bytes, sheet_name)?)));
        }

        let workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
        let names = workbook.sheet_names();
        Ok(WorkbookDecoder::Spreadsheet { workbook, names })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        match self {
            WorkbookDecoder::Spreadsheet { names, .. } => names.clone(),
            WorkbookDecoder::Csv(sheet) => sheet.iter().map(|s| s.name.clone()).collect(),
        }
    }

    pub fn read_sheet(&mut self, name: &str) -> Result<RawSheet, DecodeError> {
        match self {
            WorkbookDecoder::Spreadsheet { workbook, .. } => {
                let range = workbook
                    .worksheet_range(name)
                    .map_err(|source| DecodeError::Sheet {
                        sheet: name.to_string(),
                        source,
                    })?;
                let cells = range
                    .rows()
                    .map(|row| row.iter().map(cell_from_data).collect())
                    .collect();
                Ok(RawSheet::new(name, cells))
            }
            WorkbookDecoder::Csv(sheet) => Ok(sheet.take().unwrap_or_default()),
        }
    }
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            if dt.is_duration() {
                CellValue::Number(serial)
            } else {
                excel_serial_to_date(serial)
                    .map(CellValue::Date)
                    .unwrap_or(CellValue::Number(serial))
            }
        }
        Data::DateTimeIso(s) => parse_date(s)
            .map(CellValue::Date)
            .unwrap_or_else(|| CellValue::Text(s.clone())),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(err) => CellValue::Text(err.to_string()),
    }
}

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

fn decode_csv(bytes: &[u8], sheet_name: &str) -> Result<RawSheet, DecodeError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    // Excel on Windows writes CSV in the ANSI code page; fall back to Windows-1252 when the
    // input is not valid UTF-8.
    let text: Cow<'_, str> = match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => WINDOWS_1252.decode(bytes).0,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sniff_delimiter(&text))
        .from_reader(text.as_bytes());

    let mut cells = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = record
            .iter()
            .map(|field| {
                if field.trim().is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(field.to_string())
                }
            })
            .collect();
        cells.push(row);
    }
    Ok(RawSheet::new(sheet_name, cells))
}

/// Pick the delimiter that occurs most often on the first non-empty line.
fn sniff_delimiter(text: &str) -> u8 {
    let first_line = text.lines().find(|line| !line.trim().is_empty()).unwrap_or_default();
    [b',', b';', b'\t', b'|']
        .into_iter()
        .max_by_key(|delim| first_line.bytes().filter(|b| b == delim).count())
        .filter(|delim| first_line.as_bytes().contains(delim))
        .unwrap_or(b',')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(
        bytes: &[u8],
        format: WorkbookFormat,
        name: &str,
    ) -> Result<RawWorkbook, DecodeError> {
        let mut decoder = WorkbookDecoder::open(bytes, format, name)?;
        let sheets = decoder
            .sheet_names()
            .iter()
            .map(|sheet| decoder.read_sheet(sheet))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RawWorkbook::new(sheets))
    }

    #[test]
    fn csv_becomes_a_single_sheet_named_after_the_file() {
        let workbook = decode(
            b"Material;Stock\nM-1;12\n\n;\n",
            WorkbookFormat::Csv,
            "inventory",
        )
        .unwrap();
        assert_eq!(workbook.sheets.len(), 1);
        let sheet = &workbook.sheets[0];
        assert_eq!(sheet.name, "inventory");
        assert_eq!(sheet.cells[0], vec![CellValue::from("Material"), CellValue::from("Stock")]);
        assert_eq!(sheet.cells[1], vec![CellValue::from("M-1"), CellValue::from("12")]);
    }

    #[test]
    fn csv_falls_back_to_windows_1252() {
        // 0xE9 is `é` in Windows-1252 and invalid as a lone UTF-8 byte.
        let bytes = b"Plant,Description\nP1,Caf\xE9\n";
        let workbook = decode(bytes, WorkbookFormat::Csv, "s").unwrap();
        assert_eq!(workbook.sheets[0].cells[1][1], CellValue::from("Café"));
    }

    #[test]
    fn strips_utf8_bom() {
        let bytes = b"\xEF\xBB\xBFMaterial\nX\n";
        let workbook = decode(bytes, WorkbookFormat::Csv, "s").unwrap();
        assert_eq!(workbook.sheets[0].cells[0][0], CellValue::from("Material"));
    }

    #[test]
    fn rejects_non_zip_bytes_for_xlsx() {
        let err = decode(b"definitely not a zip", WorkbookFormat::Xlsx, "s").unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedContainer { .. }));
    }

    #[test]
    fn corrupt_zip_is_a_spreadsheet_error() {
        let err = decode(b"PK\x03\x04garbage", WorkbookFormat::Xlsx, "s").unwrap_err();
        assert!(matches!(err, DecodeError::Spreadsheet(_)));
    }

    #[test]
    fn header_row_is_the_first_non_empty_row() {
        let sheet = RawSheet::new(
            "s",
            vec![
                vec![],
                vec![CellValue::Empty, CellValue::from("  ")],
                vec![CellValue::from("Material")],
            ],
        );
        assert_eq!(sheet.header_row_index(), Some(2));
        assert_eq!(RawSheet::new("empty", vec![]).header_row_index(), None);
    }
}
