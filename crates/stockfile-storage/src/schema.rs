use rusqlite::{params, Connection};

pub(crate) fn init(conn: &Connection, now_ms: i64) -> rusqlite::Result<()> {
    // Ensure foreign keys are enforced (disabled by default in SQLite).
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS file_records (
          id TEXT PRIMARY KEY,
          file_name TEXT NOT NULL,
          file_size INTEGER NOT NULL,
          uploaded_at INTEGER NOT NULL,   -- unix millis
          processed_at INTEGER NOT NULL,  -- unix millis
          content_hash TEXT NOT NULL,
          is_active INTEGER NOT NULL DEFAULT 0 CHECK (is_active IN (0, 1)),
          document_type TEXT NOT NULL CHECK (document_type IN ('inventory', 'osr')),
          version INTEGER NOT NULL DEFAULT 1
        );

        -- Re-uploading identical bytes under one document type reuses the record.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_file_records_hash_type
          ON file_records(content_hash, document_type);
        -- At most one active record per document type.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_file_records_active_type
          ON file_records(document_type) WHERE is_active = 1;
        CREATE INDEX IF NOT EXISTS idx_file_records_uploaded ON file_records(uploaded_at);

        CREATE TABLE IF NOT EXISTS processed_sheets (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          file_record_id TEXT NOT NULL REFERENCES file_records(id) ON DELETE CASCADE,
          position INTEGER NOT NULL,
          name TEXT NOT NULL,
          document_type TEXT NOT NULL,
          row_count INTEGER NOT NULL,
          column_count INTEGER NOT NULL,
          columns JSON NOT NULL,
          rows JSON NOT NULL,
          warnings JSON NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_processed_sheets_file ON processed_sheets(file_record_id);

        CREATE TABLE IF NOT EXISTS processing_stats (
          file_record_id TEXT PRIMARY KEY REFERENCES file_records(id) ON DELETE CASCADE,
          processing_time_ms INTEGER NOT NULL,
          total_rows INTEGER NOT NULL,
          total_sheets INTEGER NOT NULL,
          total_columns INTEGER NOT NULL,
          warning_count INTEGER NOT NULL,
          created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS data_versions (
          id TEXT PRIMARY KEY,
          file_record_id TEXT NOT NULL REFERENCES file_records(id) ON DELETE CASCADE,
          version INTEGER NOT NULL,
          created_at INTEGER NOT NULL,
          description TEXT NOT NULL,
          changes JSON NOT NULL,
          is_active INTEGER NOT NULL DEFAULT 0 CHECK (is_active IN (0, 1)),
          UNIQUE (file_record_id, version)
        );

        CREATE TABLE IF NOT EXISTS preferences (
          key TEXT PRIMARY KEY,
          value JSON NOT NULL,
          updated_at INTEGER NOT NULL,
          version INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS application_state (
          id INTEGER PRIMARY KEY CHECK (id = 1),
          active_file_id TEXT REFERENCES file_records(id) ON DELETE SET NULL,
          last_active_at INTEGER NOT NULL,
          preferences JSON NOT NULL DEFAULT '{}',
          version INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )?;

    ensure_application_state(conn, now_ms)?;
    Ok(())
}

/// Insert the application-state singleton if it does not exist yet.
pub(crate) fn ensure_application_state(conn: &Connection, now_ms: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO application_state (id, active_file_id, last_active_at, preferences, version)
         VALUES (1, NULL, ?1, '{}', 1)",
        params![now_ms],
    )?;
    Ok(())
}
