use chrono::Utc;
use serde::{Deserialize, Serialize};
use stockfile_model::{
    DocumentSchema, DocumentType, ParsedSheet, ProcessedDocument, ProcessingStats,
    ProcessorConfig,
};

use crate::decode::{RawWorkbook, WorkbookDecoder};
use crate::error::{ErrorKind, ProcessingError};
use crate::file::InputFile;
use crate::format::WorkbookFormat;
use crate::pipeline::{
    CancelHandle, PipelineRun, PARSING_RANGE, PROCESSING_PROGRESS, VALIDATING_RANGE,
};
use crate::progress::{ProcessingPhase, ProcessingProgress, ProgressSink};
use crate::validate::{
    claimed_sheet_indices, detect_document_types, extra_sheets_warning, match_sheet_by_columns,
    validate_schema, ValidationError, ValidationResult,
};

/// Outcome of [`FileProcessor::process_file`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ProcessedDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProcessingError>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ProcessingStats>,
}

impl ProcessingResult {
    pub fn into_result(self) -> Result<ProcessedDocument, ProcessingError> {
        match (self.data, self.error) {
            (Some(data), None) => Ok(data),
            (_, Some(err)) => Err(err),
            (None, None) => Err(ProcessingError::new(
                ErrorKind::Validation,
                "Processing produced no data",
            )),
        }
    }
}

/// Snapshot of a processor's most recent run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorState {
    pub progress: ProcessingProgress,
    pub last_error: Option<ProcessingError>,
}

impl ProcessorState {
    pub fn phase(&self) -> ProcessingPhase {
        self.progress.phase
    }

    fn idle() -> Self {
        Self {
            progress: ProcessingProgress::idle(),
            last_error: None,
        }
    }
}

/// Turns workbook bytes into a validated [`ProcessedDocument`].
///
/// A processor handles one file at a time (`&mut self`); use one instance per thread to
/// process files in parallel.
#[derive(Debug)]
pub struct FileProcessor {
    config: ProcessorConfig,
    state: ProcessorState,
    cancel: CancelHandle,
}

impl Default for FileProcessor {
    fn default() -> Self {
        Self::new(ProcessorConfig::default())
    }
}

impl FileProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            config,
            state: ProcessorState::idle(),
            cancel: CancelHandle::default(),
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn state(&self) -> &ProcessorState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = ProcessorState::idle();
        self.cancel.clear();
    }

    /// A handle other threads can use to stop the current run at its next checkpoint.
    ///
    /// The flag is cleared when a new run starts, so cancel during a run, not before it.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn process_file(
        &mut self,
        file: &InputFile,
        sink: &mut dyn ProgressSink,
    ) -> ProcessingResult {
        self.cancel.clear();
        log::debug!("processing `{}` ({} bytes)", file.name(), file.size());

        let mut run = PipelineRun::start(sink, self.config.processing_timeout, self.cancel.clone());
        let mut warnings = Vec::new();
        let outcome = self.run_process(file, &mut run, &mut warnings);
        let processing_time_ms = run.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(document) => {
                run.complete("Processing complete");
                let stats = ProcessingStats {
                    processing_time_ms,
                    total_rows: document.total_rows(),
                    total_sheets: document.sheets.len(),
                    total_columns: document.sheets.iter().map(|s| s.column_count).sum(),
                    warning_count: warnings.len(),
                };
                log::info!(
                    "processed `{}` as {:?}: {} sheets, {} rows in {} ms",
                    file.name(),
                    document.detected_document_types,
                    stats.total_sheets,
                    stats.total_rows,
                    processing_time_ms
                );
                ProcessingResult {
                    success: true,
                    data: Some(document),
                    error: None,
                    warnings,
                    stats: Some(stats),
                }
            }
            Err(err) => {
                run.fail(&err);
                ProcessingResult {
                    success: false,
                    data: None,
                    error: Some(err),
                    warnings,
                    stats: None,
                }
            }
        };

        self.state = ProcessorState {
            progress: run.last().clone(),
            last_error: result.error.clone(),
        };
        result
    }

    /// Decode and validate without assembling a document.
    ///
    /// With `document_type`, that schema is checked directly so missing sheets are reported.
    /// Without it, the detected types are checked; when nothing is detected, the missing
    /// sheets of every known type are reported.
    pub fn validate_file_only(
        &mut self,
        file: &InputFile,
        document_type: Option<DocumentType>,
        sink: &mut dyn ProgressSink,
    ) -> Result<ValidationResult, ProcessingError> {
        self.cancel.clear();
        let mut run = PipelineRun::start(sink, self.config.processing_timeout, self.cancel.clone());
        let outcome = self.run_validation(file, document_type, &mut run);
        match &outcome {
            Ok(result) => run.complete(if result.is_valid {
                "Validation passed"
            } else {
                "Validation found errors"
            }),
            Err(err) => run.fail(err),
        }
        self.state = ProcessorState {
            progress: run.last().clone(),
            last_error: outcome.as_ref().err().cloned(),
        };
        outcome
    }

    fn run_process(
        &self,
        file: &InputFile,
        run: &mut PipelineRun<'_>,
        warnings: &mut Vec<String>,
    ) -> Result<ProcessedDocument, ProcessingError> {
        let workbook = self.decode(file, run)?;

        run.enter(ProcessingPhase::Validating, VALIDATING_RANGE.0, "Detecting document types")?;
        let detected = detect_document_types(&workbook, &self.config.registry);
        if detected.is_empty() {
            let mut err = ProcessingError::no_document_type(&self.known_types());
            err.details = self.missing_required_sheets(&workbook).errors;
            return Err(err);
        }
        log::debug!("detected document types {detected:?} in `{}`", file.name());

        let schemas = self.schemas_for(&detected)?;
        let (result, sheets) = validate_with_progress(&workbook, &schemas, run)?;
        warnings.extend(result.warnings.iter().cloned());
        if !result.is_valid {
            return Err(ProcessingError::from_validation(&result));
        }

        run.enter(ProcessingPhase::Processing, PROCESSING_PROGRESS, "Assembling results")?;
        Ok(ProcessedDocument {
            file_name: file.name().to_string(),
            file_size: file.size(),
            processed_at: Utc::now(),
            sheets,
            detected_document_types: detected,
        })
    }

    fn run_validation(
        &self,
        file: &InputFile,
        document_type: Option<DocumentType>,
        run: &mut PipelineRun<'_>,
    ) -> Result<ValidationResult, ProcessingError> {
        let workbook = self.decode(file, run)?;
        run.enter(ProcessingPhase::Validating, VALIDATING_RANGE.0, "Validating workbook")?;

        let detected = match document_type {
            Some(document_type) => vec![document_type],
            None => detect_document_types(&workbook, &self.config.registry),
        };
        if detected.is_empty() {
            return Ok(self.missing_required_sheets(&workbook));
        }
        let schemas = self.schemas_for(&detected)?;
        let (result, _) = validate_with_progress(&workbook, &schemas, run)?;
        Ok(result)
    }

    /// Reading and parsing phases.
    fn decode(
        &self,
        file: &InputFile,
        run: &mut PipelineRun<'_>,
    ) -> Result<RawWorkbook, ProcessingError> {
        if file.size() > self.config.max_file_size {
            return Err(ProcessingError::size(file.size(), self.config.max_file_size));
        }
        let extension = file.extension();
        let format = WorkbookFormat::from_extension(&extension)
            .filter(|_| self.config.is_extension_allowed(&extension))
            .ok_or_else(|| ProcessingError::format(&extension, &self.config.allowed_extensions))?;
        run.report(10, format!("Read {} bytes", file.size()));

        run.enter(ProcessingPhase::Parsing, PARSING_RANGE.0, format!("Parsing {format} workbook"))?;
        let mut decoder = WorkbookDecoder::open(file.bytes(), format, &file.stem())?;
        let names = decoder.sheet_names();
        let mut sheets = Vec::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            run.sheet(PARSING_RANGE, name, index, names.len())?;
            sheets.push(decoder.read_sheet(name)?);
        }
        if sheets.is_empty() {
            return Err(ProcessingError::new(ErrorKind::Parsing, "Workbook contains no sheets"));
        }
        let mut workbook = RawWorkbook::new(sheets);
        if format == WorkbookFormat::Csv {
            self.adopt_csv_sheet(&mut workbook);
        }
        Ok(workbook)
    }

    /// A CSV sheet is named after its file. When that name matches no schema sheet, bind it
    /// to the schema sheet its header satisfies.
    fn adopt_csv_sheet(&self, workbook: &mut RawWorkbook) {
        let registry = &self.config.registry;
        let [sheet] = workbook.sheets.as_mut_slice() else {
            return;
        };
        let named = registry
            .schemas()
            .flat_map(|schema| schema.sheets.iter())
            .any(|schema_sheet| schema_sheet.matches(&sheet.name));
        if named {
            return;
        }
        if let Some(schema_sheet) = match_sheet_by_columns(sheet, registry) {
            log::debug!(
                "treating csv sheet `{}` as `{}` based on its header",
                sheet.name,
                schema_sheet.canonical_name
            );
            sheet.name = schema_sheet.canonical_name.clone();
        }
    }

    fn schemas_for(&self, types: &[DocumentType]) -> Result<Vec<&DocumentSchema>, ProcessingError> {
        types
            .iter()
            .map(|document_type| {
                self.config
                    .registry
                    .get_schema(*document_type)
                    .map_err(|err| ProcessingError::new(ErrorKind::Validation, err.to_string()))
            })
            .collect()
    }

    fn known_types(&self) -> Vec<String> {
        self.config
            .registry
            .document_types()
            .map(|document_type| document_type.to_string())
            .collect()
    }

    /// Missing-sheet errors of every registered type, used when nothing was detected.
    fn missing_required_sheets(&self, workbook: &RawWorkbook) -> ValidationResult {
        let mut result = ValidationResult::default();
        for schema in self.config.registry.schemas() {
            for sheet in schema.required_sheets() {
                if !workbook.sheet_names().any(|name| sheet.matches(name)) {
                    result.push_error(ValidationError::missing_sheet(sheet, schema.document_type));
                }
            }
        }
        let claimed: Vec<usize> = self
            .config
            .registry
            .schemas()
            .flat_map(|schema| claimed_sheet_indices(workbook, schema))
            .collect();
        if let Some(warning) = extra_sheets_warning(workbook, &claimed) {
            result.warnings.push(warning);
        }
        result
    }
}

/// Validate each schema in turn, emitting a per-sheet event and checkpoint before every
/// matched sheet. Sheets no schema pass claimed produce one workbook-level warning.
fn validate_with_progress(
    workbook: &RawWorkbook,
    schemas: &[&DocumentSchema],
    run: &mut PipelineRun<'_>,
) -> Result<(ValidationResult, Vec<ParsedSheet>), ProcessingError> {
    let total = workbook.sheets.len();
    let mut processed = 0;
    let mut merged = ValidationResult::default();
    let mut sheets = Vec::new();
    let mut claimed = Vec::new();

    for schema in schemas {
        let validation = validate_schema(workbook, schema, |name| {
            let event = run.sheet(VALIDATING_RANGE, name, processed, total);
            processed += 1;
            event
        })?;
        merged.merge(validation.result);
        sheets.extend(validation.sheets);
        claimed.extend(validation.sheet_indices);
    }
    if let Some(warning) = extra_sheets_warning(workbook, &claimed) {
        merged.warnings.push(warning);
    }
    Ok((merged, sheets))
}
