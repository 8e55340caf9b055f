use rusqlite::{Connection, OpenFlags};
use stockfile_model::DocumentType;
use stockfile_storage::Storage;

mod common;

use common::inventory;

fn raw_connection(uri: &str) -> Connection {
    let flags =
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI;
    Connection::open_with_flags(uri, flags).expect("open raw connection")
}

#[test]
fn file_history_skips_invalid_rows() {
    let uri = "file:file_history_invalid_types?mode=memory&cache=shared";
    let storage = Storage::open_uri(uri).expect("open storage");
    let upload = inventory("good.csv", &[("M-001", 1.0)]);
    let id = storage
        .save_file(&upload.document, &upload.hash, DocumentType::Inventory)
        .expect("save");

    let conn = raw_connection(uri);
    // Non-TEXT id and an id that is not a UUID.
    conn.execute(
        "INSERT INTO file_records
           (id, file_name, file_size, uploaded_at, processed_at, content_hash, is_active, document_type, version)
         VALUES (X'00', 'blob.xlsx', 1, 0, 0, 'h1', 0, 'inventory', 1)",
        [],
    )
    .expect("insert corrupt record");
    conn.execute(
        "INSERT INTO file_records
           (id, file_name, file_size, uploaded_at, processed_at, content_hash, is_active, document_type, version)
         VALUES ('not-a-uuid', 'bad.xlsx', 1, 0, 0, 'h2', 0, 'osr', 1)",
        [],
    )
    .expect("insert corrupt record");

    let history = storage.get_file_history(None).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, id);
    assert_eq!(history[0].file_name, "good.csv");

    let stats = storage.get_storage_stats().expect("stats");
    assert_eq!(stats.total_files, 3);
}

#[test]
fn data_versions_skip_invalid_json() {
    let uri = "file:data_versions_invalid_json?mode=memory&cache=shared";
    let storage = Storage::open_uri(uri).expect("open storage");
    let upload = inventory("good.csv", &[("M-001", 1.0)]);
    let id = storage
        .save_file(&upload.document, &upload.hash, DocumentType::Inventory)
        .expect("save");

    let conn = raw_connection(uri);
    conn.execute(
        "INSERT INTO data_versions (id, file_record_id, version, created_at, description, changes, is_active)
         VALUES ('00000000-0000-4000-8000-000000000001', ?1, 7, 0, 'broken', '{not json', 0)",
        [id.to_string()],
    )
    .expect("insert corrupt version");

    let versions = storage.get_data_versions(id).expect("versions");
    let numbers: Vec<u32> = versions.iter().map(|v| v.version).collect();
    assert_eq!(numbers, vec![1]);

    // The next version still counts past the unreadable row.
    storage
        .create_data_version(id, "after corruption", &[])
        .expect("create")
        .expect("known file");
    assert_eq!(
        storage.get_file_record(id).expect("query").expect("record").version,
        8
    );
}

#[test]
fn preferences_skip_invalid_rows() {
    let uri = "file:preferences_invalid_types?mode=memory&cache=shared";
    let storage = Storage::open_uri(uri).expect("open storage");
    storage
        .set_preference("theme", serde_json::json!("dark"))
        .expect("set");

    let conn = raw_connection(uri);
    conn.execute(
        "INSERT INTO preferences (key, value, updated_at, version) VALUES (X'01', '1', 0, 1)",
        [],
    )
    .expect("insert corrupt preference");

    let prefs = storage.list_preferences().expect("list");
    assert_eq!(prefs.len(), 1);
    assert_eq!(prefs[0].key, "theme");
}
