use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ProcessingError;
use crate::progress::{ProcessingPhase, ProcessingProgress, ProgressSink, ProgressTracker};

/// Percent ranges for the per-sheet events of each phase.
pub(crate) const PARSING_RANGE: (u8, u8) = (15, 50);
pub(crate) const VALIDATING_RANGE: (u8, u8) = (55, 85);
pub(crate) const PROCESSING_PROGRESS: u8 = 90;

/// Requests cooperative cancellation of an in-flight `process_file` call.
///
/// Clones share one flag. The pipeline polls it at phase boundaries and between sheets.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Bookkeeping for one pipeline invocation: progress, deadline and cancellation.
pub(crate) struct PipelineRun<'a> {
    tracker: ProgressTracker<'a>,
    started: Instant,
    timeout: Duration,
    cancel: CancelHandle,
    phase: ProcessingPhase,
}

impl<'a> PipelineRun<'a> {
    pub(crate) fn start(
        sink: &'a mut dyn ProgressSink,
        timeout: Duration,
        cancel: CancelHandle,
    ) -> Self {
        let mut run = Self {
            tracker: ProgressTracker::new(sink),
            started: Instant::now(),
            timeout,
            cancel,
            phase: ProcessingPhase::Reading,
        };
        run.emit(ProcessingProgress::new(ProcessingPhase::Reading, 0, "Reading file"));
        run
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn last(&self) -> &ProcessingProgress {
        self.tracker.last()
    }

    /// Fail if the run was cancelled or ran past its deadline.
    pub(crate) fn checkpoint(&self) -> Result<(), ProcessingError> {
        if self.cancel.is_cancelled() {
            return Err(ProcessingError::cancelled());
        }
        if self.elapsed() >= self.timeout {
            return Err(ProcessingError::timeout(self.timeout.as_millis()));
        }
        Ok(())
    }

    /// Move to `phase` after passing a checkpoint.
    pub(crate) fn enter(
        &mut self,
        phase: ProcessingPhase,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<(), ProcessingError> {
        self.checkpoint()?;
        log::debug!("entering {phase} phase ({progress}%)");
        self.emit(ProcessingProgress::new(phase, progress, message));
        Ok(())
    }

    /// Report progress within the current phase without a checkpoint.
    pub(crate) fn report(&mut self, progress: u8, message: impl Into<String>) {
        let phase = self.phase;
        self.emit(ProcessingProgress::new(phase, progress, message));
    }

    /// Per-sheet event inside `range`, after passing a checkpoint.
    pub(crate) fn sheet(
        &mut self,
        range: (u8, u8),
        sheet: &str,
        processed: usize,
        total: usize,
    ) -> Result<(), ProcessingError> {
        self.checkpoint()?;
        let (lo, hi) = range;
        let span = usize::from(hi.saturating_sub(lo));
        let progress = lo + (span * processed / total.max(1)) as u8;
        let verb = match self.phase {
            ProcessingPhase::Parsing => "Parsing",
            ProcessingPhase::Validating => "Validating",
            _ => "Processing",
        };
        let event = ProcessingProgress::new(self.phase, progress, format!("{verb} sheet '{sheet}'"))
            .with_sheet(sheet, processed, total);
        self.emit(event);
        Ok(())
    }

    pub(crate) fn complete(&mut self, message: impl Into<String>) {
        log::debug!("pipeline complete after {:?}", self.elapsed());
        self.emit(ProcessingProgress::new(ProcessingPhase::Complete, 100, message));
    }

    /// Emit the terminal error event; progress stays where it was.
    pub(crate) fn fail(&mut self, err: &ProcessingError) {
        log::warn!("processing failed during {} phase: {err}", self.phase);
        let progress = self.tracker.last().progress;
        self.emit(ProcessingProgress::new(ProcessingPhase::Error, progress, err.message.clone()));
    }

    fn emit(&mut self, event: ProcessingProgress) {
        self.phase = event.phase;
        self.tracker.emit(event);
    }
}
