use crate::schema;
use crate::types::{FileRecord, ProcessingStatsRecord, StorageStats};
use crate::versions::insert_version_tx;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Params, Row, TransactionBehavior};
use stockfile_model::{DocumentType, ParsedSheet, ProcessedDocument, ProcessingStats};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("corrupt row in `{table}`: {reason}")]
    Corrupt { table: &'static str, reason: String },
    #[error("document has no `{0}` sheets to store")]
    NoSheetsForType(DocumentType),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Handle to the local store. Clones share one connection.
#[derive(Debug, Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

const FILE_RECORD_COLUMNS: &str =
    "id, file_name, file_size, uploaded_at, processed_at, content_hash, is_active, document_type, version";

impl Storage {
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    pub fn open_uri(uri: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(uri, flags)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        schema::init(&conn, now_ms())?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("storage mutex poisoned")
    }

    /// Persist `document` as the active file of `document_type`.
    ///
    /// Identical content (same hash and type) re-activates the existing record instead of
    /// creating a duplicate. Only the sheets of `document_type` are stored.
    pub fn save_file(
        &self,
        document: &ProcessedDocument,
        content_hash: &str,
        document_type: DocumentType,
    ) -> Result<Uuid> {
        self.save_file_with_stats(document, content_hash, document_type, None)
    }

    pub fn save_file_with_stats(
        &self,
        document: &ProcessedDocument,
        content_hash: &str,
        document_type: DocumentType,
        stats: Option<&ProcessingStats>,
    ) -> Result<Uuid> {
        let sheets: Vec<&ParsedSheet> = document.sheets_of(document_type).collect();
        if sheets.is_empty() {
            return Err(StorageError::NoSheetsForType(document_type));
        }

        let now = now_ms();
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM file_records WHERE content_hash = ?1 AND document_type = ?2",
                params![content_hash, document_type.as_str()],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(existing) = existing {
            let id = parse_uuid(&existing, "file_records")?;
            activate_tx(&tx, id, document_type, now)?;
            tx.commit()?;
            log::info!(
                "re-activated existing {document_type} file {id} for `{}`",
                document.file_name
            );
            return Ok(id);
        }

        let id = Uuid::new_v4();
        deactivate_type_tx(&tx, document_type)?;
        tx.execute(
            "INSERT INTO file_records
               (id, file_name, file_size, uploaded_at, processed_at, content_hash, is_active, document_type, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, 1)",
            params![
                id.to_string(),
                &document.file_name,
                document.file_size as i64,
                now,
                document.processed_at.timestamp_millis(),
                content_hash,
                document_type.as_str(),
            ],
        )?;

        for (position, sheet) in sheets.iter().enumerate() {
            tx.execute(
                "INSERT INTO processed_sheets
                   (file_record_id, position, name, document_type, row_count, column_count, columns, rows, warnings)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.to_string(),
                    position as i64,
                    &sheet.name,
                    sheet.document_type.as_str(),
                    sheet.row_count as i64,
                    sheet.column_count as i64,
                    serde_json::to_string(&sheet.columns)?,
                    serde_json::to_string(&sheet.rows)?,
                    serde_json::to_string(&sheet.warnings)?,
                ],
            )?;
        }

        if let Some(stats) = stats {
            tx.execute(
                "INSERT OR REPLACE INTO processing_stats
                   (file_record_id, processing_time_ms, total_rows, total_sheets, total_columns, warning_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.to_string(),
                    stats.processing_time_ms as i64,
                    stats.total_rows as i64,
                    stats.total_sheets as i64,
                    stats.total_columns as i64,
                    stats.warning_count as i64,
                    now,
                ],
            )?;
        }

        insert_version_tx(&tx, id, 1, "Initial upload", &[], now)?;
        set_active_file_state_tx(&tx, Some(id), now)?;
        tx.commit()?;

        log::info!(
            "stored {document_type} file {id} (`{}`, {} sheets)",
            document.file_name,
            sheets.len()
        );
        Ok(id)
    }

    /// Make `id` the active file of its document type. Returns `false` for unknown ids.
    pub fn switch_active_file(&self, id: Uuid) -> Result<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let document_type: Option<String> = tx
            .query_row(
                "SELECT document_type FROM file_records WHERE id = ?1",
                params![id.to_string()],
                |r| r.get(0),
            )
            .optional()?;
        let Some(document_type) = document_type else {
            return Ok(false);
        };
        let document_type = parse_document_type(&document_type, "file_records")?;
        activate_tx(&tx, id, document_type, now_ms())?;
        tx.commit()?;
        log::info!("switched active {document_type} file to {id}");
        Ok(true)
    }

    pub fn get_file_record(&self, id: Uuid) -> Result<Option<FileRecord>> {
        let conn = self.lock();
        query_record(&conn, "WHERE id = ?1", params![id.to_string()])
    }

    pub fn get_active_file(&self, document_type: DocumentType) -> Result<Option<FileRecord>> {
        let conn = self.lock();
        query_record(
            &conn,
            "WHERE document_type = ?1 AND is_active = 1",
            params![document_type.as_str()],
        )
    }

    pub fn find_by_hash(
        &self,
        content_hash: &str,
        document_type: DocumentType,
    ) -> Result<Option<FileRecord>> {
        let conn = self.lock();
        query_record(
            &conn,
            "WHERE content_hash = ?1 AND document_type = ?2",
            params![content_hash, document_type.as_str()],
        )
    }

    /// Stored files, newest upload first. Rows that fail to decode are skipped.
    pub fn get_file_history(&self, document_type: Option<DocumentType>) -> Result<Vec<FileRecord>> {
        let conn = self.lock();
        match document_type {
            Some(document_type) => query_records(
                &conn,
                "WHERE document_type = ?1 ORDER BY uploaded_at DESC, rowid DESC",
                params![document_type.as_str()],
            ),
            None => query_records(&conn, "ORDER BY uploaded_at DESC, rowid DESC", []),
        }
    }

    pub fn get_file_data(&self, id: Uuid) -> Result<Option<ProcessedDocument>> {
        let conn = self.lock();
        let Some(record) = query_record(&conn, "WHERE id = ?1", params![id.to_string()])? else {
            return Ok(None);
        };
        load_document(&conn, record).map(Some)
    }

    /// Data of the active file of `document_type`.
    ///
    /// Without a type, the file recorded in the application state is used while it is still
    /// active, falling back to the most recently uploaded active file.
    pub fn get_active_file_data(
        &self,
        document_type: Option<DocumentType>,
    ) -> Result<Option<ProcessedDocument>> {
        let conn = self.lock();
        let record = match document_type {
            Some(document_type) => query_record(
                &conn,
                "WHERE document_type = ?1 AND is_active = 1",
                params![document_type.as_str()],
            )?,
            None => {
                let remembered: Option<String> = conn
                    .query_row(
                        "SELECT active_file_id FROM application_state WHERE id = 1",
                        [],
                        |r| r.get(0),
                    )
                    .optional()?
                    .flatten();
                let remembered = match remembered {
                    Some(id) => query_record(
                        &conn,
                        "WHERE id = ?1 AND is_active = 1",
                        params![id],
                    )?,
                    None => None,
                };
                match remembered {
                    Some(record) => Some(record),
                    None => query_record(
                        &conn,
                        "WHERE is_active = 1 ORDER BY uploaded_at DESC, rowid DESC LIMIT 1",
                        [],
                    )?,
                }
            }
        };
        match record {
            Some(record) => load_document(&conn, record).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_processing_stats(&self, id: Uuid) -> Result<Option<ProcessingStatsRecord>> {
        let conn = self.lock();
        load_processing_stats(&conn, id)
    }

    /// Remove a file with its sheets, stats and versions. Returns `false` for unknown ids.
    ///
    /// No other file is activated in its place.
    pub fn delete_file(&self, id: Uuid) -> Result<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let key = id.to_string();
        for table in ["data_versions", "processing_stats", "processed_sheets"] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE file_record_id = ?1"),
                params![key],
            )?;
        }
        tx.execute(
            "UPDATE application_state
             SET active_file_id = NULL, last_active_at = ?2, version = version + 1
             WHERE id = 1 AND active_file_id = ?1",
            params![key, now_ms()],
        )?;
        let removed = tx.execute("DELETE FROM file_records WHERE id = ?1", params![key])?;
        if removed == 0 {
            return Ok(false);
        }
        tx.commit()?;
        log::info!("deleted file {id}");
        Ok(true)
    }

    /// Delete inactive files uploaded before `older_than`. Returns how many were removed.
    pub fn cleanup_inactive_files(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let cutoff = older_than.timestamp_millis();
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        const STALE: &str = "SELECT id FROM file_records WHERE is_active = 0 AND uploaded_at < ?1";
        for table in ["data_versions", "processing_stats", "processed_sheets"] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE file_record_id IN ({STALE})"),
                params![cutoff],
            )?;
        }
        let removed = tx.execute(
            "DELETE FROM file_records WHERE is_active = 0 AND uploaded_at < ?1",
            params![cutoff],
        )?;
        tx.commit()?;
        if removed > 0 {
            log::info!("removed {removed} inactive files uploaded before {older_than}");
        }
        Ok(removed)
    }

    pub fn get_storage_stats(&self) -> Result<StorageStats> {
        let conn = self.lock();
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
            Ok(n.max(0) as usize)
        };
        let mut stats = StorageStats {
            total_files: count("SELECT COUNT(*) FROM file_records")?,
            active_files: count("SELECT COUNT(*) FROM file_records WHERE is_active = 1")?,
            total_sheets: count("SELECT COUNT(*) FROM processed_sheets")?,
            total_rows: count("SELECT COALESCE(SUM(row_count), 0) FROM processed_sheets")?,
            total_versions: count("SELECT COUNT(*) FROM data_versions")?,
            ..StorageStats::default()
        };

        let mut stmt = conn.prepare(
            "SELECT document_type, COUNT(*) FROM file_records GROUP BY document_type",
        )?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
        for row in rows {
            let (document_type, n) = row?;
            match document_type.parse::<DocumentType>() {
                Ok(document_type) => {
                    stats.files_by_type.insert(document_type, n.max(0) as usize);
                }
                Err(err) => log::warn!("skipping file_records count: {err}"),
            }
        }
        Ok(stats)
    }

    /// Remove every stored file, version and preference and reset the application state.
    pub fn clear_all_data(&self) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute_batch(
            "DELETE FROM application_state;
             DELETE FROM data_versions;
             DELETE FROM processing_stats;
             DELETE FROM processed_sheets;
             DELETE FROM file_records;
             DELETE FROM preferences;",
        )?;
        schema::ensure_application_state(&tx, now_ms())?;
        tx.commit()?;
        log::info!("cleared all stored data");
        Ok(())
    }
}

fn deactivate_type_tx(conn: &Connection, document_type: DocumentType) -> Result<()> {
    conn.execute(
        "UPDATE file_records SET is_active = 0 WHERE document_type = ?1 AND is_active = 1",
        params![document_type.as_str()],
    )?;
    Ok(())
}

fn activate_tx(conn: &Connection, id: Uuid, document_type: DocumentType, now: i64) -> Result<()> {
    deactivate_type_tx(conn, document_type)?;
    conn.execute(
        "UPDATE file_records SET is_active = 1 WHERE id = ?1",
        params![id.to_string()],
    )?;
    set_active_file_state_tx(conn, Some(id), now)
}

pub(crate) fn set_active_file_state_tx(
    conn: &Connection,
    id: Option<Uuid>,
    now: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE application_state
         SET active_file_id = ?1, last_active_at = ?2, version = version + 1
         WHERE id = 1",
        params![id.map(|id| id.to_string()), now],
    )?;
    Ok(())
}

struct RawFileRecord {
    id: String,
    file_name: String,
    file_size: i64,
    uploaded_at: i64,
    processed_at: i64,
    content_hash: String,
    is_active: bool,
    document_type: String,
    version: i64,
}

impl RawFileRecord {
    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            file_name: r.get(1)?,
            file_size: r.get(2)?,
            uploaded_at: r.get(3)?,
            processed_at: r.get(4)?,
            content_hash: r.get(5)?,
            is_active: r.get(6)?,
            document_type: r.get(7)?,
            version: r.get(8)?,
        })
    }

    fn into_record(self) -> Result<FileRecord> {
        const TABLE: &str = "file_records";
        Ok(FileRecord {
            id: parse_uuid(&self.id, TABLE)?,
            file_name: self.file_name,
            file_size: u64::try_from(self.file_size).map_err(|err| corrupt(TABLE, err))?,
            uploaded_at: datetime_from_ms(self.uploaded_at, TABLE)?,
            processed_at: datetime_from_ms(self.processed_at, TABLE)?,
            content_hash: self.content_hash,
            is_active: self.is_active,
            document_type: parse_document_type(&self.document_type, TABLE)?,
            version: u32::try_from(self.version).map_err(|err| corrupt(TABLE, err))?,
        })
    }
}

pub(crate) fn query_record(
    conn: &Connection,
    tail: &str,
    params: impl Params,
) -> Result<Option<FileRecord>> {
    let sql = format!("SELECT {FILE_RECORD_COLUMNS} FROM file_records {tail}");
    let raw = conn.query_row(&sql, params, RawFileRecord::from_row).optional()?;
    raw.map(RawFileRecord::into_record).transpose()
}

pub(crate) fn query_records(
    conn: &Connection,
    tail: &str,
    params: impl Params,
) -> Result<Vec<FileRecord>> {
    let sql = format!("SELECT {FILE_RECORD_COLUMNS} FROM file_records {tail}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, RawFileRecord::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        match row.map_err(StorageError::from).and_then(RawFileRecord::into_record) {
            Ok(record) => out.push(record),
            Err(err) => log::warn!("skipping unreadable file record: {err}"),
        }
    }
    Ok(out)
}

pub(crate) fn load_sheets(conn: &Connection, file_id: Uuid) -> Result<Vec<ParsedSheet>> {
    let mut stmt = conn.prepare(
        "SELECT name, document_type, columns, rows, warnings
         FROM processed_sheets WHERE file_record_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![file_id.to_string()], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
            r.get::<_, String>(4)?,
        ))
    })?;

    let mut sheets = Vec::new();
    for row in rows {
        let (name, document_type, columns, data, warnings) = row?;
        sheets.push(ParsedSheet::new(
            name,
            parse_document_type(&document_type, "processed_sheets")?,
            serde_json::from_str(&columns)?,
            serde_json::from_str(&data)?,
            serde_json::from_str(&warnings)?,
        ));
    }
    Ok(sheets)
}

pub(crate) fn load_processing_stats(
    conn: &Connection,
    id: Uuid,
) -> Result<Option<ProcessingStatsRecord>> {
    let raw = conn
        .query_row(
            "SELECT processing_time_ms, total_rows, total_sheets, total_columns, warning_count, created_at
             FROM processing_stats WHERE file_record_id = ?1",
            params![id.to_string()],
            |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, i64>(4)?,
                    r.get::<_, i64>(5)?,
                ))
            },
        )
        .optional()?;
    let Some((time_ms, rows, sheets, columns, warnings, created_at)) = raw else {
        return Ok(None);
    };
    Ok(Some(ProcessingStatsRecord {
        file_record_id: id,
        processing_time_ms: time_ms.max(0) as u64,
        total_rows: rows.max(0) as usize,
        total_sheets: sheets.max(0) as usize,
        total_columns: columns.max(0) as usize,
        warning_count: warnings.max(0) as usize,
        created_at: datetime_from_ms(created_at, "processing_stats")?,
    }))
}

pub(crate) fn load_document(conn: &Connection, record: FileRecord) -> Result<ProcessedDocument> {
    let sheets = load_sheets(conn, record.id)?;
    Ok(ProcessedDocument {
        file_name: record.file_name,
        file_size: record.file_size,
        processed_at: record.processed_at,
        sheets,
        detected_document_types: vec![record.document_type],
    })
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn datetime_from_ms(ms: i64, table: &'static str) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| corrupt(table, format!("timestamp {ms} out of range")))
}

pub(crate) fn parse_uuid(value: &str, table: &'static str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|err| corrupt(table, err))
}

pub(crate) fn parse_document_type(value: &str, table: &'static str) -> Result<DocumentType> {
    value.parse().map_err(|err| corrupt(table, err))
}

pub(crate) fn corrupt(table: &'static str, reason: impl ToString) -> StorageError {
    StorageError::Corrupt {
        table,
        reason: reason.to_string(),
    }
}
