use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use stockfile_model::{DocumentType, ParsedSheet};
use uuid::Uuid;

use crate::storage::{load_processing_stats, load_sheets, query_records, Result, Storage};
use crate::types::{ApplicationState, FileRecord, Preference, ProcessingStatsRecord};

pub const EXPORT_FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("unknown export format `{other}` (expected json or csv)")),
        }
    }
}

/// What [`Storage::export_data`] writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// File metadata per record, plus preferences and application state (JSON only).
    pub include_metadata: bool,
    pub include_processing_stats: bool,
    /// Stored sheets per record. CSV output lists sheet names and row totals instead.
    pub include_sheet_data: bool,
    /// Restrict the export to one document type.
    pub document_type: Option<DocumentType>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument {
    export_date: DateTime<Utc>,
    format_version: &'static str,
    files: Vec<ExportedFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preferences: Option<Vec<Preference>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    application_state: Option<ApplicationState>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportedFile {
    id: Uuid,
    file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<FileRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sheets: Option<Vec<ParsedSheet>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<ProcessingStatsRecord>,
}

impl Storage {
    /// Serialize stored files (newest upload first) as JSON or CSV.
    pub fn export_data(&self, options: &ExportOptions) -> Result<String> {
        let files = self.collect_export(options)?;
        let output = match options.format {
            ExportFormat::Json => {
                let (preferences, application_state) = if options.include_metadata {
                    (Some(self.list_preferences()?), Some(self.get_application_state()?))
                } else {
                    (None, None)
                };
                let document = ExportDocument {
                    export_date: Utc::now(),
                    format_version: EXPORT_FORMAT_VERSION,
                    files,
                    preferences,
                    application_state,
                };
                serde_json::to_string_pretty(&document)?
            }
            ExportFormat::Csv => write_csv(&files, options)?,
        };
        log::info!("exported stored data as {}", options.format);
        Ok(output)
    }

    fn collect_export(&self, options: &ExportOptions) -> Result<Vec<ExportedFile>> {
        let conn = self.lock();
        let records = match options.document_type {
            Some(document_type) => query_records(
                &conn,
                "WHERE document_type = ?1 ORDER BY uploaded_at DESC, rowid DESC",
                [document_type.as_str()],
            )?,
            None => query_records(&conn, "ORDER BY uploaded_at DESC, rowid DESC", [])?,
        };

        let mut files = Vec::with_capacity(records.len());
        for record in records {
            let sheets = if options.include_sheet_data {
                Some(load_sheets(&conn, record.id)?)
            } else {
                None
            };
            let stats = if options.include_processing_stats {
                load_processing_stats(&conn, record.id)?
            } else {
                None
            };
            files.push(ExportedFile {
                id: record.id,
                file_name: record.file_name.clone(),
                metadata: options.include_metadata.then_some(record),
                sheets,
                stats,
            });
        }
        Ok(files)
    }
}

fn write_csv(files: &[ExportedFile], options: &ExportOptions) -> Result<String> {
    let mut header = vec!["id", "fileName"];
    if options.include_metadata {
        header.extend([
            "documentType",
            "fileSize",
            "uploadedAt",
            "processedAt",
            "contentHash",
            "isActive",
            "version",
        ]);
    }
    if options.include_processing_stats {
        header.extend([
            "processingTimeMs",
            "totalRows",
            "totalSheets",
            "totalColumns",
            "warningCount",
        ]);
    }
    if options.include_sheet_data {
        header.extend(["sheets", "rowCount"]);
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header)?;

    for file in files {
        let mut record = vec![file.id.to_string(), file.file_name.clone()];
        if options.include_metadata {
            match &file.metadata {
                Some(meta) => record.extend([
                    meta.document_type.to_string(),
                    meta.file_size.to_string(),
                    meta.uploaded_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                    meta.processed_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                    meta.content_hash.clone(),
                    meta.is_active.to_string(),
                    meta.version.to_string(),
                ]),
                None => record.extend(std::iter::repeat(String::new()).take(7)),
            }
        }
        if options.include_processing_stats {
            match &file.stats {
                Some(stats) => record.extend([
                    stats.processing_time_ms.to_string(),
                    stats.total_rows.to_string(),
                    stats.total_sheets.to_string(),
                    stats.total_columns.to_string(),
                    stats.warning_count.to_string(),
                ]),
                None => record.extend(std::iter::repeat(String::new()).take(5)),
            }
        }
        if options.include_sheet_data {
            let sheets = file.sheets.as_deref().unwrap_or_default();
            let names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
            let rows: usize = sheets.iter().map(|s| s.row_count).sum();
            record.push(names.join("; "));
            record.push(rows.to_string());
        }
        writer.write_record(&record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
