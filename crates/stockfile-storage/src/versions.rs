use crate::storage::{corrupt, datetime_from_ms, now_ms, parse_uuid, Result, Storage, StorageError};
use crate::types::DataVersion;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

pub(crate) fn insert_version_tx(
    conn: &Connection,
    file_id: Uuid,
    version: u32,
    description: &str,
    changes: &[String],
    now: i64,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    conn.execute(
        "UPDATE data_versions SET is_active = 0 WHERE file_record_id = ?1 AND is_active = 1",
        params![file_id.to_string()],
    )?;
    conn.execute(
        "INSERT INTO data_versions (id, file_record_id, version, created_at, description, changes, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
        params![
            id.to_string(),
            file_id.to_string(),
            version,
            now,
            description,
            serde_json::to_string(changes)?,
        ],
    )?;
    Ok(id)
}

impl Storage {
    /// Record a new version (`max + 1`) of a stored file and make it the active one.
    ///
    /// Returns `None` if `file_id` is unknown.
    pub fn create_data_version(
        &self,
        file_id: Uuid,
        description: &str,
        changes: &[String],
    ) -> Result<Option<Uuid>> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let key = file_id.to_string();

        let exists = tx
            .query_row("SELECT 1 FROM file_records WHERE id = ?1", params![key], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Ok(None);
        }

        let current: i64 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM data_versions WHERE file_record_id = ?1",
            params![key],
            |r| r.get(0),
        )?;
        let next = u32::try_from(current + 1).map_err(|err| corrupt("data_versions", err))?;

        let id = insert_version_tx(&tx, file_id, next, description, changes, now_ms())?;
        tx.execute(
            "UPDATE file_records SET version = ?2 WHERE id = ?1",
            params![key, next],
        )?;
        tx.commit()?;

        log::info!("created version {next} of file {file_id}");
        Ok(Some(id))
    }

    /// Versions of a file, newest first. Rows that fail to decode are skipped.
    pub fn get_data_versions(&self, file_id: Uuid) -> Result<Vec<DataVersion>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, version, created_at, description, changes, is_active
             FROM data_versions WHERE file_record_id = ?1
             ORDER BY version DESC",
        )?;
        let rows = stmt.query_map(params![file_id.to_string()], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, i64>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, bool>(5)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let decoded = row.map_err(StorageError::from).and_then(|raw| -> Result<DataVersion> {
                let (id, version, created_at, description, changes, is_active) = raw;
                Ok(DataVersion {
                    id: parse_uuid(&id, "data_versions")?,
                    file_record_id: file_id,
                    version: u32::try_from(version)
                        .map_err(|err| corrupt("data_versions", err))?,
                    created_at: datetime_from_ms(created_at, "data_versions")?,
                    description,
                    changes: serde_json::from_str(&changes)?,
                    is_active,
                })
            });
            match decoded {
                Ok(version) => out.push(version),
                Err(err) => log::warn!("skipping unreadable data version of {file_id}: {err}"),
            }
        }
        Ok(out)
    }

    /// Delete all but the newest `keep` versions of a file (at least one is always kept).
    ///
    /// Returns how many versions were removed.
    pub fn cleanup_old_versions(&self, file_id: Uuid, keep: usize) -> Result<usize> {
        let keep = keep.max(1) as i64;
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = tx.execute(
            "DELETE FROM data_versions
             WHERE file_record_id = ?1
               AND version NOT IN (
                 SELECT version FROM data_versions
                 WHERE file_record_id = ?1
                 ORDER BY version DESC
                 LIMIT ?2
               )",
            params![file_id.to_string(), keep],
        )?;
        tx.commit()?;
        if removed > 0 {
            log::info!("removed {removed} old versions of file {file_id}");
        }
        Ok(removed)
    }
}
