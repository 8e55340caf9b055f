//! Workbook ingestion for stockfile.
//!
//! [`FileProcessor`] runs the pipeline `reading -> parsing -> validating -> processing ->
//! complete`, reporting [`ProcessingProgress`] to a caller supplied [`ProgressSink`]:
//!
//! - [`decode`] turns xlsx/xlsm/xlsb/xls/ods bytes (via `calamine`) and CSV text into a
//!   [`RawWorkbook`];
//! - [`validate`] matches sheets and columns against the document schemas and projects rows
//!   onto canonical columns;
//! - failures are returned as [`ProcessingError`] values, never panics.

pub mod decode;
mod error;
mod file;
pub mod format;
mod hash;
mod pipeline;
pub mod progress;
mod processor;
pub mod validate;

pub use decode::{DecodeError, RawSheet, RawWorkbook, WorkbookDecoder};
pub use error::{ErrorKind, ProcessingError};
pub use file::InputFile;
pub use format::WorkbookFormat;
pub use hash::generate_file_hash;
pub use pipeline::CancelHandle;
pub use processor::{FileProcessor, ProcessingResult, ProcessorState};
pub use progress::{
    ChannelSink, NoProgress, ProcessingPhase, ProcessingProgress, ProgressLog, ProgressSink,
};
pub use validate::{
    detect_document_types, validate, SchemaValidation, ValidationError, ValidationErrorKind,
    ValidationResult,
};
