use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use serde_json::Value;

const INVENTORY_CSV: &str = "Material,Material Description,Plant,Storage Location,Batch,Stock,Base Unit of Measure,Currency,Total Stock Value\n\
    M-001,Widget,P100,S1,B1,10,EA,INR,1000\n\
    M-002,Gadget,P100,S1,B2,5,EA,INR,750\n";

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    fn db(&self) -> PathBuf {
        self.dir.path().join("store.db")
    }

    fn file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("write fixture");
        path
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(assert_cmd::cargo::cargo_bin!("stockfile"))
            .args(args)
            .env("STOCKFILE_DB", self.db())
            .env_remove("STOCKFILE_CONFIG")
            .env("RUST_LOG", "warn")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .expect("run stockfile")
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "`stockfile {}` failed\nstdout:\n{}\nstderr:\n{}",
            args.join(" "),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
        serde_json::from_slice(&output.stdout).expect("json output")
    }
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}

#[test]
fn ingest_then_list_and_switch() {
    let ws = Workspace::new();
    let march = ws.file("march.csv", INVENTORY_CSV);
    let april = ws.file("april.csv", &INVENTORY_CSV.replace("M-002", "M-003"));

    let report = ws.json(&["ingest", path_arg(&march)]);
    assert_eq!(report["saved"][0]["documentType"], "inventory");
    assert_eq!(report["stats"]["totalRows"], 2);
    let march_id = report["saved"][0]["fileId"].as_str().expect("id").to_string();

    ws.json(&["ingest", path_arg(&april)]);
    let files = ws.json(&["files", "--type", "inventory"]);
    let files = files.as_array().expect("array");
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["fileName"], "april.csv");
    assert_eq!(files[0]["isActive"], true);
    assert_eq!(files[1]["isActive"], false);

    let switched = ws.json(&["switch", &march_id]);
    assert_eq!(switched["isActive"], true);

    // Re-ingesting identical bytes reuses the stored record.
    let again = ws.json(&["ingest", path_arg(&march)]);
    assert_eq!(again["saved"][0]["fileId"], march_id.as_str());
    let stats = ws.json(&["stats"]);
    assert_eq!(stats["totalFiles"], 2);
}

#[test]
fn failed_ingest_reports_the_error_and_exits_non_zero() {
    let ws = Workspace::new();
    let items = ws.file("items.csv", "Item,Quantity\nBolt,4\n");

    let output = ws.run(&["ingest", path_arg(&items)]);
    assert!(!output.status.success());
    let error: Value = serde_json::from_slice(&output.stdout).expect("json error");
    assert_eq!(error["kind"], "sheets");

    let files = ws.json(&["files"]);
    assert_eq!(files, Value::Array(Vec::new()));
}

#[test]
fn validate_does_not_touch_the_database() {
    let ws = Workspace::new();
    let march = ws.file("march.csv", INVENTORY_CSV);

    let result = ws.json(&["validate", path_arg(&march), "--type", "inventory"]);
    assert_eq!(result["isValid"], true);
    assert_eq!(result["rowsProcessed"], 2);

    let output = ws.run(&["validate", path_arg(&march), "--type", "osr"]);
    assert!(!output.status.success());
    assert!(!ws.db().exists());
}

#[test]
fn versions_preferences_and_export() {
    let ws = Workspace::new();
    let march = ws.file("march.csv", INVENTORY_CSV);
    let report = ws.json(&["ingest", path_arg(&march)]);
    let id = report["saved"][0]["fileId"].as_str().expect("id").to_string();

    let created = ws.json(&["version", &id, "--description", "Fixed stock", "--change", "Stock"]);
    assert_eq!(created["version"], 2);
    let versions = ws.json(&["versions", &id]);
    assert_eq!(versions[0]["version"], 2);
    assert_eq!(versions[0]["changes"][0], "Stock");

    ws.json(&["pref", "set", "pageSize", "50"]);
    ws.json(&["pref", "set", "theme", "dark"]);
    assert_eq!(ws.json(&["pref", "get", "pageSize"]), Value::from(50));
    assert_eq!(ws.json(&["pref", "get", "theme"]), Value::from("dark"));
    assert!(!ws.run(&["pref", "get", "missing"]).status.success());

    let out = ws.dir.path().join("export.csv");
    let output = ws.run(&["export", "--format", "csv", "--metadata", "--output", path_arg(&out)]);
    assert!(output.status.success());
    let csv = std::fs::read_to_string(&out).expect("export file");
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.contains("march.csv"));

    let export = ws.json(&["export", "--metadata", "--sheets"]);
    assert_eq!(export["files"][0]["sheets"][0]["rowCount"], 2);
    assert_eq!(export["preferences"].as_array().map(Vec::len), Some(2));

    ws.json(&["delete", &id]);
    assert!(!ws.run(&["delete", &id]).status.success());

    ws.json(&["reset"]);
    assert_eq!(ws.json(&["stats"])["totalFiles"], 0);
    assert!(!ws.run(&["pref", "get", "theme"]).status.success());
}

#[test]
fn cleanup_rejects_a_cutoff_before_the_earliest_date() {
    let ws = Workspace::new();
    let march = ws.file("march.csv", INVENTORY_CSV);
    ws.json(&["ingest", path_arg(&march)]);

    let output = ws.run(&["cleanup", "--days", "4000000000"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("earliest date"), "{stderr}");
    assert!(!stderr.contains("panicked"), "{stderr}");

    let removed = ws.json(&["cleanup", "--days", "30"]);
    assert_eq!(removed["removed"], 0);
    assert_eq!(ws.json(&["stats"])["totalFiles"], 1);
}

#[test]
fn cli_does_not_panic_on_broken_pipe() {
    let ws = Workspace::new();
    let march = ws.file("march.csv", INVENTORY_CSV);
    ws.json(&["ingest", path_arg(&march)]);

    let mut child = Command::new(assert_cmd::cargo::cargo_bin!("stockfile"))
        .args(["export", "--metadata", "--sheets", "--stats"])
        .env("STOCKFILE_DB", ws.db())
        .env("RUST_LOG", "warn")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn stockfile");

    // Closing the read end forces stdout writes to return EPIPE / BrokenPipe.
    drop(child.stdout.take());

    let output = child.wait_with_output().expect("wait for stockfile");
    assert!(
        output.status.success(),
        "expected success even when stdout is closed\nstderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
}
