#![allow(dead_code)]

use rust_xlsxwriter::{Format, Workbook};

/// A cell in a fixture sheet.
pub enum Cell<'a> {
    Text(&'a str),
    Number(f64),
    /// Excel serial date written with a date number format.
    Date(f64),
    Blank,
}

pub use Cell::{Blank, Date, Number, Text};

pub struct SheetFixture<'a> {
    pub name: &'a str,
    pub rows: Vec<Vec<Cell<'a>>>,
}

impl<'a> SheetFixture<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            rows: Vec::new(),
        }
    }

    pub fn header(mut self, columns: &[&'a str]) -> Self {
        self.rows.push(columns.iter().map(|c| Text(*c)).collect());
        self
    }

    pub fn row(mut self, cells: Vec<Cell<'a>>) -> Self {
        self.rows.push(cells);
        self
    }

    pub fn blank_row(mut self) -> Self {
        self.rows.push(Vec::new());
        self
    }
}

pub fn build_xlsx(sheets: &[SheetFixture<'_>]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.name).expect("sheet name");
        for (row, cells) in sheet.rows.iter().enumerate() {
            let row = row as u32;
            for (col, cell) in cells.iter().enumerate() {
                let col = col as u16;
                match cell {
                    Text(text) => {
                        worksheet.write_string(row, col, *text).expect("write string");
                    }
                    Number(value) => {
                        worksheet.write_number(row, col, *value).expect("write number");
                    }
                    Date(serial) => {
                        worksheet
                            .write_number_with_format(row, col, *serial, &date_format)
                            .expect("write date");
                    }
                    Blank => {}
                }
            }
        }
    }
    workbook.save_to_buffer().expect("save workbook")
}

pub const INVENTORY_COLUMNS: [&str; 9] = [
    "Material",
    "Material Description",
    "Plant",
    "Storage Location",
    "Batch",
    "Stock",
    "Base Unit of Measure",
    "Currency",
    "Total Stock Value",
];

pub fn inventory_row<'a>(material: &'a str, stock: f64, value: f64) -> Vec<Cell<'a>> {
    vec![
        Text(material),
        Text("Finished widget"),
        Text("P100"),
        Text("S001"),
        Text("B01"),
        Number(stock),
        Text("EA"),
        Text("INR"),
        Number(value),
    ]
}

/// The three-row "FG Value" sheet most scenarios start from.
pub fn fg_value_sheet<'a>() -> SheetFixture<'a> {
    SheetFixture::new("FG Value")
        .header(&INVENTORY_COLUMNS)
        .row(inventory_row("M-001", 10.0, 1000.0))
        .row(inventory_row("M-002", 5.0, 750.0))
        .row(inventory_row("M-003", 1250.0, 12500.5))
}

pub const OSR_COLUMNS: [&str; 8] = [
    "Customer Name",
    "Sales Document",
    "Material",
    "Material Description",
    "Order Quantity",
    "Open Quantity",
    "Open Value",
    "Delivery Date",
];

pub fn osr_main_sheet<'a>() -> SheetFixture<'a> {
    SheetFixture::new("OSR Main Sheet HC")
        .header(&OSR_COLUMNS)
        .row(vec![
            Text("Acme Traders"),
            Text("SO-1001"),
            Text("M-001"),
            Text("Finished widget"),
            Number(20.0),
            Number(8.0),
            Number(800.0),
            // 2024-03-15
            Date(45366.0),
        ])
        .row(vec![
            Text("Bharat Stores"),
            Text("SO-1002"),
            Text("M-002"),
            Text("Gadget"),
            Number(5.0),
            Number(5.0),
            Number(375.0),
            Text("31/03/2024"),
        ])
}
