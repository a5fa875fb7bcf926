//! Failing-response diagnostics sink
//!
//! Raw bodies of failed requests are appended between marker lines, keyed
//! by the business identifier being processed, so a rejected batch can be
//! inspected after the pass. One lock serialises all writers.

use aspace_common::Result;
use chrono::{SecondsFormat, Utc};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

const START_MARKER: &str = "<<<<<<<<<<<<<<<<<<<<<<<<<<<";
const END_MARKER: &str = ">>>>>>>>>>>>>>>>>>>>>>>>>>>";

/// Which kind of request produced the entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Upload,
    Update,
    Conversion,
    Search,
    Lookup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Upload => "UPLOAD",
            Phase::Update => "UPDATE",
            Phase::Conversion => "CONVERSION",
            Phase::Search => "SEARCH",
            Phase::Lookup => "LOOKUP",
        })
    }
}

pub struct DiagnosticsLog {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl DiagnosticsLog {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Mutex::new(Box::new(writer)),
        }
    }

    /// Append to `path`, creating it if needed
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }

    /// Discard everything
    pub fn disabled() -> Self {
        Self::new(std::io::sink())
    }

    /// Record the raw body of a failed response
    pub fn response(&self, phase: Phase, key: &str, body: &str) {
        self.write_entry("Response", phase, key, body);
    }

    /// Record a transport error that produced no response
    pub fn error(&self, phase: Phase, key: &str, error: &dyn fmt::Display) {
        self.write_entry("Error", phase, key, &error.to_string());
    }

    fn write_entry(&self, kind: &str, phase: Phase, key: &str, text: &str) {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut sink = self.sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let written = writeln!(sink, "{} for '{}' at {} [{}]", kind, key, timestamp, phase)
            .and_then(|_| writeln!(sink, "{}", START_MARKER))
            .and_then(|_| writeln!(sink, "{}", text))
            .and_then(|_| writeln!(sink, "{}", END_MARKER))
            .and_then(|_| sink.flush());

        if let Err(e) = written {
            tracing::warn!(key, error = %e, "Failed to write diagnostics entry");
        }
    }
}
