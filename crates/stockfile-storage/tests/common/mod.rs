#![allow(dead_code)]

use stockfile_io::{generate_file_hash, FileProcessor, InputFile, NoProgress};
use stockfile_model::{ProcessedDocument, ProcessingStats};

pub const INVENTORY_HEADER: &str = "Material,Material Description,Plant,Storage Location,Batch,Stock,Base Unit of Measure,Currency,Total Stock Value";
pub const OSR_HEADER: &str =
    "Customer Name,Sales Document,Material,Material Description,Order Quantity,Open Quantity,Open Value,Delivery Date";

/// An ingested upload ready to be saved.
pub struct Upload {
    pub document: ProcessedDocument,
    pub hash: String,
    pub stats: ProcessingStats,
}

/// Run `csv` through the ingestion pipeline the way the CLI does.
pub fn ingest(name: &str, csv: &str) -> Upload {
    let file = InputFile::new(name, csv);
    let mut processor = FileProcessor::default();
    let result = processor.process_file(&file, &mut NoProgress);
    let stats = result.stats.clone().expect("stats");
    let document = result.into_result().expect("ingest fixture");
    Upload {
        document,
        hash: generate_file_hash(file.bytes()),
        stats,
    }
}

/// Inventory upload whose rows are `(material, stock)` pairs.
pub fn inventory(name: &str, rows: &[(&str, f64)]) -> Upload {
    let mut csv = format!("{INVENTORY_HEADER}\n");
    for (material, stock) in rows {
        csv.push_str(&format!(
            "{material},Widget,P100,S1,B1,{stock},EA,INR,{}\n",
            stock * 10.0
        ));
    }
    ingest(name, &csv)
}

pub fn osr(name: &str, customers: &[&str]) -> Upload {
    let mut csv = format!("{OSR_HEADER}\n");
    for (i, customer) in customers.iter().enumerate() {
        csv.push_str(&format!(
            "{customer},SO-{i},M-001,Widget,10,4,400,2024-03-15\n"
        ));
    }
    ingest(name, &csv)
}
