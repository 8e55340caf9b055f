use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use stockfile_model::DocumentType;
use uuid::Uuid;

/// Metadata of one stored upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: Uuid,
    pub file_name: String,
    pub file_size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    /// Lowercase hex SHA-256 of the uploaded bytes.
    pub content_hash: String,
    pub is_active: bool,
    pub document_type: DocumentType,
    /// Mirrors the newest [`DataVersion::version`] of this file.
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataVersion {
    pub id: Uuid,
    pub file_record_id: Uuid,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub changes: Vec<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStatsRecord {
    pub file_record_id: Uuid,
    pub processing_time_ms: u64,
    pub total_rows: usize,
    pub total_sheets: usize,
    pub total_columns: usize,
    pub warning_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preference {
    pub key: String,
    pub value: JsonValue,
    pub updated_at: DateTime<Utc>,
    /// Number of writes to this key.
    pub version: u32,
}

/// The singleton row describing what the UI was last looking at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationState {
    pub active_file_id: Option<Uuid>,
    pub last_active_at: DateTime<Utc>,
    pub preferences: Map<String, JsonValue>,
    pub version: u64,
}

/// Partial update for [`ApplicationState`]. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationStatePatch {
    /// `Some(None)` clears the active file.
    pub active_file_id: Option<Option<Uuid>>,
    /// Shallow-merged into the stored preferences object.
    pub preferences: Option<Map<String, JsonValue>>,
}

impl ApplicationStatePatch {
    pub fn active_file(mut self, id: Option<Uuid>) -> Self {
        self.active_file_id = Some(id);
        self
    }

    pub fn preference(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.preferences
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }
}

/// Totals across the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total_files: usize,
    pub active_files: usize,
    pub total_sheets: usize,
    pub total_rows: usize,
    pub total_versions: usize,
    pub files_by_type: BTreeMap<DocumentType, usize>,
}
