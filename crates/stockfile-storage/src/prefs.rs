use crate::storage::{datetime_from_ms, now_ms, parse_uuid, Result, Storage, StorageError};
use crate::types::{ApplicationState, ApplicationStatePatch, Preference};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

impl Storage {
    /// Insert or overwrite a preference. Each write bumps the key's version.
    pub fn set_preference(&self, key: &str, value: JsonValue) -> Result<Preference> {
        let now = now_ms();
        let encoded = serde_json::to_string(&value)?;
        let conn = self.lock();
        let version: i64 = conn.query_row(
            "INSERT INTO preferences (key, value, updated_at, version) VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at,
               version = preferences.version + 1
             RETURNING version",
            params![key, encoded, now],
            |r| r.get(0),
        )?;
        log::debug!("preference `{key}` set (version {version})");
        Ok(Preference {
            key: key.to_string(),
            value,
            updated_at: datetime_from_ms(now, "preferences")?,
            version: version.max(0) as u32,
        })
    }

    pub fn get_preference(&self, key: &str) -> Result<Option<Preference>> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                "SELECT value, updated_at, version FROM preferences WHERE key = ?1",
                params![key],
                |r| Ok((r.get::<_, JsonValue>(0)?, r.get::<_, i64>(1)?, r.get::<_, i64>(2)?)),
            )
            .optional()?;
        raw.map(|(value, updated_at, version)| -> Result<Preference> {
            Ok(Preference {
                key: key.to_string(),
                value,
                updated_at: datetime_from_ms(updated_at, "preferences")?,
                version: version.max(0) as u32,
            })
        })
        .transpose()
    }

    /// Typed read of a preference, falling back to `default` when the key is missing or its
    /// value does not deserialize as `T`.
    pub fn get_preference_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        let Some(pref) = self.get_preference(key)? else {
            return Ok(default);
        };
        match serde_json::from_value(pref.value) {
            Ok(value) => Ok(value),
            Err(err) => {
                log::warn!("preference `{key}` has an unexpected shape, using default: {err}");
                Ok(default)
            }
        }
    }

    pub fn delete_preference(&self, key: &str) -> Result<bool> {
        let conn = self.lock();
        let removed = conn.execute("DELETE FROM preferences WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    /// All preferences ordered by key. Rows that fail to decode are skipped.
    pub fn list_preferences(&self) -> Result<Vec<Preference>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT key, value, updated_at, version FROM preferences ORDER BY key")?;
        let rows = stmt.query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, JsonValue>(1)?,
                r.get::<_, i64>(2)?,
                r.get::<_, i64>(3)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let decoded = row
                .map_err(StorageError::from)
                .and_then(|(key, value, updated_at, version)| -> Result<Preference> {
                    Ok(Preference {
                        key,
                        value,
                        updated_at: datetime_from_ms(updated_at, "preferences")?,
                        version: version.max(0) as u32,
                    })
                });
            match decoded {
                Ok(pref) => out.push(pref),
                Err(err) => log::warn!("skipping unreadable preference: {err}"),
            }
        }
        Ok(out)
    }

    pub fn get_application_state(&self) -> Result<ApplicationState> {
        let conn = self.lock();
        read_application_state(&conn)
    }

    /// Apply `patch` to the application state singleton and return the result.
    ///
    /// `preferences` are shallow-merged by key. Every call refreshes `last_active_at` and
    /// increments `version` by one.
    pub fn update_application_state(
        &self,
        patch: ApplicationStatePatch,
    ) -> Result<ApplicationState> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut state = read_application_state(&tx)?;

        if let Some(active_file_id) = patch.active_file_id {
            state.active_file_id = active_file_id;
        }
        if let Some(preferences) = patch.preferences {
            state.preferences.extend(preferences);
        }

        let now = now_ms();
        tx.execute(
            "UPDATE application_state
             SET active_file_id = ?1, preferences = ?2, last_active_at = ?3, version = version + 1
             WHERE id = 1",
            params![
                state.active_file_id.map(|id| id.to_string()),
                JsonValue::Object(state.preferences.clone()),
                now,
            ],
        )?;
        let state = read_application_state(&tx)?;
        tx.commit()?;
        Ok(state)
    }
}

fn read_application_state(conn: &Connection) -> Result<ApplicationState> {
    const TABLE: &str = "application_state";
    let (active_file_id, last_active_at, preferences, version) = conn.query_row(
        "SELECT active_file_id, last_active_at, preferences, version FROM application_state WHERE id = 1",
        [],
        |r| {
            Ok((
                r.get::<_, Option<String>>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, JsonValue>(2)?,
                r.get::<_, i64>(3)?,
            ))
        },
    )?;

    let preferences = match preferences {
        JsonValue::Object(map) => map,
        JsonValue::Null => Map::new(),
        other => {
            log::warn!("application state preferences are not an object ({other}), ignoring");
            Map::new()
        }
    };

    Ok(ApplicationState {
        active_file_id: active_file_id
            .as_deref()
            .map(|id| parse_uuid(id, TABLE))
            .transpose()?,
        last_active_at: datetime_from_ms(last_active_at, TABLE)?,
        preferences,
        version: version.max(0) as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn preferences_upsert_and_count_writes() {
        let storage = Storage::open_in_memory().expect("open storage");
        let first = storage.set_preference("theme", json!("dark")).expect("set");
        assert_eq!(first.version, 1);
        let second = storage.set_preference("theme", json!("light")).expect("set");
        assert_eq!(second.version, 2);

        let stored = storage.get_preference("theme").expect("get").expect("exists");
        assert_eq!(stored.value, json!("light"));
        assert_eq!(stored.version, 2);

        storage.set_preference("pageSize", json!(50)).expect("set");
        let keys: Vec<String> = storage
            .list_preferences()
            .expect("list")
            .into_iter()
            .map(|p| p.key)
            .collect();
        assert_eq!(keys, vec!["pageSize".to_string(), "theme".to_string()]);

        assert!(storage.delete_preference("theme").expect("delete"));
        assert!(!storage.delete_preference("theme").expect("delete"));
        assert_eq!(storage.get_preference("theme").expect("get"), None);
    }

    #[test]
    fn typed_reads_fall_back_to_default() {
        let storage = Storage::open_in_memory().expect("open storage");
        assert_eq!(storage.get_preference_or("pageSize", 25u32).expect("read"), 25);

        storage.set_preference("pageSize", json!(100)).expect("set");
        assert_eq!(storage.get_preference_or("pageSize", 25u32).expect("read"), 100);

        storage.set_preference("pageSize", json!("lots")).expect("set");
        assert_eq!(storage.get_preference_or("pageSize", 25u32).expect("read"), 25);
    }

    #[test]
    fn application_state_merges_and_versions() {
        let storage = Storage::open_in_memory().expect("open storage");
        let initial = storage.get_application_state().expect("state");
        assert_eq!(initial.active_file_id, None);
        assert!(initial.preferences.is_empty());

        let updated = storage
            .update_application_state(
                ApplicationStatePatch::default()
                    .preference("sidebar", json!(true))
                    .preference("tab", json!("osr")),
            )
            .expect("update");
        assert_eq!(updated.version, initial.version + 1);

        let updated = storage
            .update_application_state(
                ApplicationStatePatch::default().preference("tab", json!("inventory")),
            )
            .expect("update");
        assert_eq!(updated.version, initial.version + 2);
        assert_eq!(updated.preferences.get("sidebar"), Some(&json!(true)));
        assert_eq!(updated.preferences.get("tab"), Some(&json!("inventory")));
        assert!(updated.last_active_at >= initial.last_active_at);
    }
}
