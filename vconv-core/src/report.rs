//! Structured failure reports and the sinks that receive them.

use std::fs::{create_dir_all, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub video_id: Option<i64>,
    pub error: String,
    pub details: String,
    pub time: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(
        video_id: Option<i64>,
        error: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            video_id,
            error: error.into(),
            details: details.into(),
            time: Utc::now(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Receives one report per failed task. Implementations must not fail the caller.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, report: &ErrorReport);
}

/// Emits reports as `tracing` error events.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, report: &ErrorReport) {
        match report.to_json() {
            Ok(details) => error!(error_details = %details, "Processing error"),
            Err(err) => error!(
                video_id = ?report.video_id,
                stage = %report.error,
                details = %report.details,
                serialize_error = %err,
                "Processing error"
            ),
        }
    }
}

/// Appends each report as one JSON line to a file.
#[derive(Debug)]
pub struct JsonLinesReporter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, report: &ErrorReport) -> std::io::Result<()> {
        let line = report.to_json()?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)?;
            }
        }
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

impl ErrorReporter for JsonLinesReporter {
    fn report(&self, report: &ErrorReport) {
        if let Err(err) = self.append(report) {
            warn!(path = %self.path.display(), error = %err, "failed to append failure report");
        }
    }
}

/// Keeps reports in memory; handy for tests and for callers that inspect
/// failures after a run.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    reports: Mutex<Vec<ErrorReport>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_empty()
    }
}

impl ErrorReporter for MemoryReporter {
    fn report(&self, report: &ErrorReport) {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(report.clone());
    }
}

/// Forwards every report to each inner reporter in order.
#[derive(Default)]
pub struct CompositeReporter {
    reporters: Vec<Arc<dyn ErrorReporter>>,
}

impl CompositeReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl ErrorReporter for CompositeReporter {
    fn report(&self, report: &ErrorReport) {
        for reporter in &self.reporters {
            reporter.report(report);
        }
    }
}
