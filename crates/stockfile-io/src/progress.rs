use std::fmt;
use std::sync::mpsc::Sender;

use serde::{Deserialize, Serialize};

/// Pipeline phases in the order they are entered. `Error` is terminal and reachable from any
/// other phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingPhase {
    Reading,
    Parsing,
    Validating,
    Processing,
    Complete,
    Error,
}

impl ProcessingPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingPhase::Reading => "reading",
            ProcessingPhase::Parsing => "parsing",
            ProcessingPhase::Validating => "validating",
            ProcessingPhase::Processing => "processing",
            ProcessingPhase::Complete => "complete",
            ProcessingPhase::Error => "error",
        }
    }
}

impl fmt::Display for ProcessingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingProgress {
    pub phase: ProcessingPhase,
    /// Percentage in `0..=100`.
    pub progress: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_sheet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_sheets: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_sheets: Option<usize>,
}

impl ProcessingProgress {
    pub fn new(phase: ProcessingPhase, progress: u8, message: impl Into<String>) -> Self {
        Self {
            phase,
            progress: progress.min(100),
            message: message.into(),
            current_sheet: None,
            total_sheets: None,
            processed_sheets: None,
        }
    }

    pub fn idle() -> Self {
        Self::new(ProcessingPhase::Reading, 0, "Idle")
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>, processed: usize, total: usize) -> Self {
        self.current_sheet = Some(sheet.into());
        self.processed_sheets = Some(processed);
        self.total_sheets = Some(total);
        self
    }
}

/// Receives progress events from the pipeline.
pub trait ProgressSink {
    fn on_progress(&mut self, progress: &ProcessingProgress);
}

impl<F> ProgressSink for F
where
    F: FnMut(&ProcessingProgress),
{
    fn on_progress(&mut self, progress: &ProcessingProgress) {
        self(progress)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&mut self, _progress: &ProcessingProgress) {}
}

/// Records every event, mostly useful in tests and for replaying a run.
#[derive(Debug, Clone, Default)]
pub struct ProgressLog {
    pub events: Vec<ProcessingProgress>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&ProcessingProgress> {
        self.events.last()
    }

    pub fn phases(&self) -> Vec<ProcessingPhase> {
        let mut phases: Vec<ProcessingPhase> = Vec::new();
        for event in &self.events {
            if phases.last() != Some(&event.phase) {
                phases.push(event.phase);
            }
        }
        phases
    }
}

impl ProgressSink for ProgressLog {
    fn on_progress(&mut self, progress: &ProcessingProgress) {
        self.events.push(progress.clone());
    }
}

/// Forwards events over a channel, e.g. to a UI thread. A disconnected receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink(pub Sender<ProcessingProgress>);

impl ProgressSink for ChannelSink {
    fn on_progress(&mut self, progress: &ProcessingProgress) {
        let _ = self.0.send(progress.clone());
    }
}

/// Wraps a sink and keeps the reported percentage non-decreasing.
pub(crate) struct ProgressTracker<'a> {
    sink: &'a mut dyn ProgressSink,
    high_water: u8,
    last: ProcessingProgress,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self {
            sink,
            high_water: 0,
            last: ProcessingProgress::idle(),
        }
    }

    pub(crate) fn emit(&mut self, mut event: ProcessingProgress) {
        event.progress = event.progress.clamp(self.high_water, 100);
        self.high_water = event.progress;
        self.sink.on_progress(&event);
        self.last = event;
    }

    pub(crate) fn last(&self) -> &ProcessingProgress {
        &self.last
    }
}
