use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use stockfile_io::{FileProcessor, InputFile, NoProgress, ProcessingProgress};
use stockfile_model::{DocumentType, ProcessingStats, ProcessorConfig};
use stockfile_storage::{ExportFormat, ExportOptions, Storage};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "stockfile")]
#[command(about = "Ingest inventory and open-sales-order workbooks into a local versioned store.")]
struct Cli {
    /// SQLite database file.
    #[arg(long, global = true, env = "STOCKFILE_DB", default_value = "stockfile.db")]
    db: PathBuf,

    /// Processor configuration (JSON). Built-in schemas and limits are used when omitted.
    #[arg(long, global = true, env = "STOCKFILE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process a workbook and store it once per detected document type.
    Ingest {
        file: PathBuf,
    },
    /// Check a workbook against the schemas without storing anything.
    Validate {
        file: PathBuf,
        /// Validate against this document type instead of detecting it.
        #[arg(long = "type")]
        document_type: Option<DocumentType>,
    },
    /// List stored files, newest upload first.
    Files {
        #[arg(long = "type")]
        document_type: Option<DocumentType>,
    },
    /// Make a stored file the active one for its document type.
    Switch {
        id: Uuid,
    },
    /// Delete a stored file with its sheets, stats and versions.
    Delete {
        id: Uuid,
    },
    /// List the versions of a stored file.
    Versions {
        id: Uuid,
    },
    /// Record a new version of a stored file.
    Version {
        id: Uuid,
        #[arg(long)]
        description: String,
        /// Changed item (repeatable).
        #[arg(long = "change")]
        changes: Vec<String>,
    },
    /// Export stored data as JSON or CSV.
    Export(ExportArgs),
    /// Read or write preferences.
    #[command(subcommand)]
    Pref(PrefCommand),
    /// Show store-wide totals.
    Stats,
    /// Delete inactive files uploaded more than `--days` days ago.
    Cleanup {
        #[arg(long)]
        days: u32,
    },
    /// Remove all stored data.
    Reset,
}

#[derive(Debug, Parser)]
struct ExportArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Include file metadata, preferences and application state.
    #[arg(long)]
    metadata: bool,

    /// Include processing stats.
    #[arg(long)]
    stats: bool,

    /// Include stored sheet data.
    #[arg(long)]
    sheets: bool,

    #[arg(long = "type")]
    document_type: Option<DocumentType>,

    /// Write to this file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum PrefCommand {
    Get {
        key: String,
    },
    /// Set a preference. Values that are not valid JSON are stored as strings.
    Set {
        key: String,
        value: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

impl From<OutputFormat> for ExportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => ExportFormat::Json,
            OutputFormat::Csv => ExportFormat::Csv,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SavedFile {
    document_type: DocumentType,
    file_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestReport {
    file_name: String,
    content_hash: String,
    saved: Vec<SavedFile>,
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<ProcessingStats>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ingest { file } => {
            let config = load_config(cli.config.as_deref())?;
            let storage = open_storage(&cli.db)?;
            ingest(config, &storage, &file)
        }
        Command::Validate { file, document_type } => {
            let config = load_config(cli.config.as_deref())?;
            validate(config, &file, document_type)
        }
        Command::Files { document_type } => {
            let storage = open_storage(&cli.db)?;
            emit(&storage.get_file_history(document_type)?)
        }
        Command::Switch { id } => {
            let storage = open_storage(&cli.db)?;
            if !storage.switch_active_file(id)? {
                bail!("no stored file with id {id}");
            }
            emit(&storage.get_file_record(id)?)
        }
        Command::Delete { id } => {
            let storage = open_storage(&cli.db)?;
            if !storage.delete_file(id)? {
                bail!("no stored file with id {id}");
            }
            emit(&json!({ "deleted": id }))
        }
        Command::Versions { id } => {
            let storage = open_storage(&cli.db)?;
            emit(&storage.get_data_versions(id)?)
        }
        Command::Version {
            id,
            description,
            changes,
        } => {
            let storage = open_storage(&cli.db)?;
            let Some(version_id) = storage.create_data_version(id, &description, &changes)? else {
                bail!("no stored file with id {id}");
            };
            let version = storage.get_file_record(id)?.map(|record| record.version);
            emit(&json!({ "versionId": version_id, "version": version }))
        }
        Command::Export(args) => {
            let storage = open_storage(&cli.db)?;
            export(&storage, args)
        }
        Command::Pref(PrefCommand::Get { key }) => {
            let storage = open_storage(&cli.db)?;
            match storage.get_preference(&key)? {
                Some(pref) => emit(&pref.value),
                None => bail!("preference `{key}` is not set"),
            }
        }
        Command::Pref(PrefCommand::Set { key, value }) => {
            let storage = open_storage(&cli.db)?;
            let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
            emit(&storage.set_preference(&key, value)?)
        }
        Command::Stats => {
            let storage = open_storage(&cli.db)?;
            emit(&storage.get_storage_stats()?)
        }
        Command::Cleanup { days } => {
            let storage = open_storage(&cli.db)?;
            let cutoff = Utc::now()
                .checked_sub_signed(Duration::days(i64::from(days)))
                .with_context(|| format!("--days {days} reaches before the earliest date"))?;
            let removed = storage.cleanup_inactive_files(cutoff)?;
            emit(&json!({ "removed": removed }))
        }
        Command::Reset => {
            let storage = open_storage(&cli.db)?;
            storage.clear_all_data()?;
            emit(&json!({ "cleared": true }))
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ProcessorConfig> {
    match path {
        Some(path) => ProcessorConfig::from_path(path)
            .with_context(|| format!("load config {}", path.display())),
        None => Ok(ProcessorConfig::default()),
    }
}

fn open_storage(path: &Path) -> Result<Storage> {
    Storage::open_path(path).with_context(|| format!("open database {}", path.display()))
}

fn read_input(path: &Path) -> Result<InputFile> {
    InputFile::from_path(path).with_context(|| format!("read {}", path.display()))
}

fn ingest(config: ProcessorConfig, storage: &Storage, path: &Path) -> Result<()> {
    let file = read_input(path)?;
    let mut processor = FileProcessor::new(config);
    let mut report = |event: &ProcessingProgress| {
        log::debug!("{:>3}% {}: {}", event.progress, event.phase, event.message);
    };
    let result = processor.process_file(&file, &mut report);

    let warnings = result.warnings.clone();
    let stats = result.stats.clone();
    let document = match result.into_result() {
        Ok(document) => document,
        Err(err) => {
            emit(&err)?;
            bail!("{err}");
        }
    };

    let content_hash = file.content_hash();
    let mut saved = Vec::new();
    for &document_type in &document.detected_document_types {
        let file_id = storage.save_file_with_stats(
            &document,
            &content_hash,
            document_type,
            stats.as_ref(),
        )?;
        saved.push(SavedFile {
            document_type,
            file_id,
        });
    }

    emit(&IngestReport {
        file_name: document.file_name,
        content_hash,
        saved,
        warnings,
        stats,
    })
}

fn validate(
    config: ProcessorConfig,
    path: &Path,
    document_type: Option<DocumentType>,
) -> Result<()> {
    let file = read_input(path)?;
    let mut processor = FileProcessor::new(config);
    match processor.validate_file_only(&file, document_type, &mut NoProgress) {
        Ok(result) => {
            emit(&result)?;
            if !result.is_valid {
                bail!("{} failed validation with {} errors", file.name(), result.errors.len());
            }
            Ok(())
        }
        Err(err) => {
            emit(&err)?;
            bail!("{err}");
        }
    }
}

fn export(storage: &Storage, args: ExportArgs) -> Result<()> {
    let options = ExportOptions {
        format: args.format.into(),
        include_metadata: args.metadata,
        include_processing_stats: args.stats,
        include_sheet_data: args.sheets,
        document_type: args.document_type,
    };
    let output = storage.export_data(&options)?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, output).with_context(|| format!("write {}", path.display()))?;
            log::info!("wrote {} export to {}", options.format, path.display());
            Ok(())
        }
        None => write_stdout(&output),
    }
}

fn emit(value: &impl Serialize) -> Result<()> {
    write_stdout(&serde_json::to_string_pretty(value)?)
}

/// Write to stdout, treating a closed pipe as success.
fn write_stdout(text: &str) -> Result<()> {
    let mut out = io::stdout().lock();
    match writeln!(out, "{text}").and_then(|()| out.flush()) {
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => Ok(other?),
    }
}
