//! SQLite-backed storage for processed stockfile documents.
//!
//! Exposes:
//! - Content-addressed file records with one active file per document type
//! - Stored sheets and processing stats per file
//! - Per-file data version history
//! - Preferences and the application-state singleton
//! - JSON / CSV export

mod export;
mod prefs;
mod schema;
pub mod storage;
mod types;
mod versions;

pub use export::{ExportFormat, ExportOptions, EXPORT_FORMAT_VERSION};
pub use storage::{Storage, StorageError};
pub use types::{
    ApplicationState, ApplicationStatePatch, DataVersion, FileRecord, Preference,
    ProcessingStatsRecord, StorageStats,
};
