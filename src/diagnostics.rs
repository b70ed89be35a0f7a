/*!
 * Degrade-and-continue diagnostics.
 *
 * Per-unit failures never abort a run. Each stage hands the event to a
 * `DiagnosticsSink` and carries on with the remaining units; the controller
 * writes whatever was collected to an issues log at the end of the run.
 */

use anyhow::Result;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::errors::DubError;
use crate::file_utils::FileManager;

/// Pipeline stage an event was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Captions,
    Merge,
    Translate,
    Synthesize,
    Plan,
    Render,
    Assemble,
}

impl Stage {
    /// Lowercase stage name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Captions => "captions",
            Self::Merge => "merge",
            Self::Translate => "translate",
            Self::Synthesize => "synthesize",
            Self::Plan => "plan",
            Self::Render => "render",
            Self::Assemble => "assemble",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded failure or warning
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticEvent {
    // @field: Stage that raised the event
    pub stage: Stage,
    // @field: What went wrong
    pub error: DubError,
}

impl DiagnosticEvent {
    pub fn new(stage: Stage, error: DubError) -> Self {
        Self { stage, error }
    }

    /// Severity label used in logs
    pub fn level(&self) -> &'static str {
        if self.error.is_warning() { "WARN" } else { "ERROR" }
    }
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.level(), self.stage, self.error)
    }
}

/// Receiver for per-unit diagnostics
pub trait DiagnosticsSink: Send + Sync {
    /// Record one event
    fn record(&self, event: DiagnosticEvent);

    /// Convenience wrapper building the event in place
    fn report(&self, stage: Stage, error: DubError) {
        self.record(DiagnosticEvent::new(stage, error));
    }
}

/// Sink that only forwards to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn record(&self, event: DiagnosticEvent) {
        log_event(&event);
    }
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn record(&self, _event: DiagnosticEvent) {}
}

/// Thread-safe in-memory sink; also logs every event as it arrives
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far, in arrival order
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().clone()
    }

    /// Take the recorded events, leaving the sink empty
    pub fn drain(&self) -> Vec<DiagnosticEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Events raised by one stage
    pub fn for_stage(&self, stage: Stage) -> Vec<DiagnosticEvent> {
        self.events.lock()
            .iter()
            .filter(|event| event.stage == stage)
            .cloned()
            .collect()
    }
}

impl DiagnosticsSink for MemorySink {
    fn record(&self, event: DiagnosticEvent) {
        log_event(&event);
        self.events.lock().push(event);
    }
}

fn log_event(event: &DiagnosticEvent) {
    if event.error.is_warning() {
        debug!("{}: {}", event.stage, event.error);
    } else {
        warn!("{}: {}", event.stage, event.error);
    }
}

/// Write collected events to an issues log file.
///
/// Nothing is written when there are no events.
pub fn write_issue_log<P: AsRef<Path>>(events: &[DiagnosticEvent], path: P, context: &str) -> Result<bool> {
    if events.is_empty() {
        return Ok(false);
    }

    let mut content = String::new();
    content.push_str(&format!("Dubbing Issues - {}\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")));
    content.push_str(&format!("Context: {}\n\n", context));

    for event in events {
        content.push_str(&format!("{}\n", event));
    }

    FileManager::write_to_file(path, &content)?;
    Ok(true)
}
