use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use stockfile_io::{ErrorKind, FileProcessor, InputFile, NoProgress, ValidationErrorKind};
use stockfile_model::{CellValue, DocumentType, ProcessorConfig};

mod common;

use common::{
    build_xlsx, fg_value_sheet, inventory_row, osr_main_sheet, Number, SheetFixture, Text,
    INVENTORY_COLUMNS,
};

fn process(name: &str, bytes: Vec<u8>) -> stockfile_io::ProcessingResult {
    let mut processor = FileProcessor::default();
    processor.process_file(&InputFile::new(name, bytes), &mut NoProgress)
}

#[test]
fn three_row_inventory_workbook_is_processed() {
    let bytes = build_xlsx(&[fg_value_sheet()]);
    let result = process("inventory.xlsx", bytes);

    assert!(result.success, "unexpected error: {:?}", result.error);
    let document = result.data.expect("document");
    assert_eq!(document.file_name, "inventory.xlsx");
    assert_eq!(document.detected_document_types, vec![DocumentType::Inventory]);
    assert_eq!(document.sheets.len(), 1);

    let sheet = &document.sheets[0];
    assert_eq!(sheet.name, "FG Value");
    assert_eq!(sheet.row_count, 3);
    assert_eq!(
        sheet.columns,
        INVENTORY_COLUMNS.iter().map(|c| c.to_string()).collect::<Vec<_>>()
    );
    assert_eq!(sheet.rows[2]["Stock"], CellValue::Number(1250.0));
    assert_eq!(sheet.rows[0]["Material"], CellValue::from("M-001"));

    let stats = result.stats.expect("stats");
    assert_eq!(stats.total_rows, 3);
    assert_eq!(stats.total_sheets, 1);
    assert_eq!(stats.total_columns, 9);
}

#[test]
fn aliases_casing_and_column_order_do_not_matter() {
    let sheet = SheetFixture::new("finished goods")
        .header(&[
            "total value",
            "STOCK QTY",
            "plant code",
            "Material Desc.",
            "material no",
            "Remarks",
        ])
        .row(vec![Number(99.5), Number(3.0), Text("P1"), Text("Widget"), Text("M-9"), Text("ok")]);
    let result = process("fg.xlsx", build_xlsx(&[sheet]));

    assert!(result.success, "unexpected error: {:?}", result.error);
    let document = result.data.expect("document");
    let sheet = &document.sheets[0];
    assert_eq!(sheet.name, "finished goods");
    // Output follows schema order, not source order.
    assert_eq!(
        sheet.columns,
        vec!["Material", "Material Description", "Plant", "Stock", "Total Stock Value"]
    );
    assert_eq!(sheet.rows[0]["Total Stock Value"], CellValue::Number(99.5));

    let extra: Vec<&String> = result
        .warnings
        .iter()
        .filter(|w| w.starts_with("Extra columns ignored"))
        .collect();
    assert_eq!(extra.len(), 1);
    assert!(extra[0].ends_with("Remarks"));
}

#[test]
fn missing_required_column_names_sheet_and_column() {
    let columns: Vec<&str> = INVENTORY_COLUMNS
        .iter()
        .copied()
        .filter(|c| *c != "Plant")
        .collect();
    let sheet = SheetFixture::new("FG Value").header(&columns).row(vec![
        Text("M-001"),
        Text("Widget"),
        Text("S1"),
        Text("B1"),
        Number(1.0),
        Text("EA"),
        Text("INR"),
        Number(10.0),
    ]);
    let result = process("inventory.xlsx", build_xlsx(&[sheet]));

    assert!(!result.success);
    let err = result.error.expect("error");
    assert_eq!(err.kind, ErrorKind::Columns);
    assert_eq!(err.sheet.as_deref(), Some("FG Value"));
    assert_eq!(err.column.as_deref(), Some("Plant"));
    assert_eq!(err.details[0].kind, ValidationErrorKind::MissingColumn);
}

#[test]
fn unrelated_columns_fail_with_sheets_or_columns() {
    fn items(name: &str) -> SheetFixture<'_> {
        SheetFixture::new(name)
            .header(&["Item", "Quantity", "Price"])
            .row(vec![Text("Bolt"), Number(4.0), Number(0.5)])
    }

    let unnamed = process("items.xlsx", build_xlsx(&[items("Sheet1")]));
    assert_eq!(unnamed.error.expect("error").kind, ErrorKind::Sheets);

    let named = process("items.xlsx", build_xlsx(&[items("FG Value")]));
    let err = named.error.expect("error");
    assert_eq!(err.kind, ErrorKind::Columns);
    assert!(err.details.len() >= 5, "{:?}", err.details);
}

#[test]
fn extra_sheets_produce_one_warning_and_stay_valid() {
    let bytes = build_xlsx(&[
        SheetFixture::new("Cover").header(&["Prepared by"]),
        fg_value_sheet(),
        SheetFixture::new("Pivot").header(&["Row Labels"]),
    ]);
    let result = process("inventory.xlsx", bytes);
    assert!(result.success, "unexpected error: {:?}", result.error);
    let extra: Vec<&String> = result
        .warnings
        .iter()
        .filter(|w| w.starts_with("Extra sheets ignored"))
        .collect();
    assert_eq!(extra, vec!["Extra sheets ignored: Cover, Pivot"]);
}

#[test]
fn duplicate_sheet_for_a_claimed_alias_is_reported() {
    let second = SheetFixture::new("Inventory")
        .header(&INVENTORY_COLUMNS)
        .row(inventory_row("M-900", 7.0, 700.0));
    let result = process("inventory.xlsx", build_xlsx(&[fg_value_sheet(), second]));
    assert!(result.success, "unexpected error: {:?}", result.error);

    let document = result.data.expect("document");
    let names: Vec<&str> = document.sheets.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["FG Value"]);
    assert!(
        result
            .warnings
            .contains(&"Extra sheets ignored: Inventory".to_string()),
        "{:?}",
        result.warnings
    );
}

#[test]
fn optional_rpm_sheet_is_included_when_present() {
    let rpm = SheetFixture::new("RPM Stock")
        .header(&INVENTORY_COLUMNS)
        .row(inventory_row("R-100", 40.0, 4000.0));
    let result = process("inventory.xlsx", build_xlsx(&[fg_value_sheet(), rpm]));
    let document = result.data.expect("document");
    let names: Vec<&str> = document.sheets.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["FG Value", "RPM Stock"]);
    assert_eq!(document.total_rows(), 4);
}

#[test]
fn osr_dates_are_normalized() {
    let result = process("osr.xlsx", build_xlsx(&[osr_main_sheet()]));
    assert!(result.success, "unexpected error: {:?}", result.error);
    let document = result.data.expect("document");
    assert_eq!(document.detected_document_types, vec![DocumentType::Osr]);

    let rows = &document.sheets[0].rows;
    assert_eq!(
        rows[0]["Delivery Date"],
        CellValue::Date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
    );
    assert_eq!(
        rows[1]["Delivery Date"],
        CellValue::Date(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
    );
}

#[test]
fn workbook_with_both_families_is_detected_as_both() {
    let result = process("combined.xlsx", build_xlsx(&[fg_value_sheet(), osr_main_sheet()]));
    let document = result.data.expect("document");
    assert_eq!(
        document.detected_document_types,
        vec![DocumentType::Inventory, DocumentType::Osr]
    );
    assert_eq!(document.sheets_of(DocumentType::Osr).count(), 1);
    assert!(!result.warnings.iter().any(|w| w.starts_with("Extra sheets")));
}

#[test]
fn size_format_and_parsing_errors() {
    let bytes = build_xlsx(&[fg_value_sheet()]);
    let limit = (bytes.len() - 1) as u64;
    let mut small = FileProcessor::new(ProcessorConfig::default().with_max_file_size(limit));
    let file = InputFile::new("inventory.xlsx", bytes.clone());
    let result = small.process_file(&file, &mut NoProgress);
    assert_eq!(result.error.expect("error").kind, ErrorKind::Size);

    let mut csv_only =
        FileProcessor::new(ProcessorConfig::default().with_allowed_extensions(["csv"]));
    let result = csv_only.process_file(&InputFile::new("inventory.xlsx", bytes), &mut NoProgress);
    assert_eq!(result.error.expect("error").kind, ErrorKind::Format);

    let garbage = process("inventory.xlsx", b"PK\x03\x04 this is not a workbook".to_vec());
    assert_eq!(garbage.error.expect("error").kind, ErrorKind::Parsing);

    let renamed_text = process("inventory.xls", b"Material,Stock\n".to_vec());
    assert_eq!(renamed_text.error.expect("error").kind, ErrorKind::Parsing);
}

#[test]
fn validate_only_does_not_require_detection() {
    let mut processor = FileProcessor::default();
    let bytes = build_xlsx(&[SheetFixture::new("Sheet1").header(&["Item"])]);
    let file = InputFile::new("items.xlsx", bytes);
    let result = processor
        .validate_file_only(&file, None, &mut NoProgress)
        .expect("validation runs");
    assert!(!result.is_valid);
    let missing: Vec<&str> = result
        .errors
        .iter()
        .filter(|e| e.kind == ValidationErrorKind::MissingSheet)
        .filter_map(|e| e.sheet.as_deref())
        .collect();
    assert_eq!(missing, vec!["FG Value", "OSR Main Sheet HC"]);

    let file = InputFile::new("inventory.xlsx", build_xlsx(&[fg_value_sheet()]));
    let result = processor
        .validate_file_only(&file, Some(DocumentType::Inventory), &mut NoProgress)
        .expect("validation runs");
    assert!(result.is_valid);
    assert_eq!(result.sheets_found, vec!["FG Value".to_string()]);
    assert_eq!(result.rows_processed, 3);
}
