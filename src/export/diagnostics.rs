//! Leveled export diagnostics.
//!
//! Every message is emitted as a `tracing` event with a `rank` field (the
//! indentation depth a host UI would render it at). Errors, warnings and
//! messages are also kept so the caller can present them after the pass.

use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error,
    Warning,
    Message,
    Verbose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub rank: u32,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, rank: u32, message: impl Into<String>) {
        let message = message.into();
        error!(rank, "{message}");
        self.push(Severity::Error, rank, message);
    }

    pub fn warning(&mut self, rank: u32, message: impl Into<String>) {
        let message = message.into();
        warn!(rank, "{message}");
        self.push(Severity::Warning, rank, message);
    }

    pub fn message(&mut self, rank: u32, message: impl Into<String>) {
        let message = message.into();
        info!(rank, "{message}");
        self.push(Severity::Message, rank, message);
    }

    /// Verbose output only goes to the log.
    pub fn verbose(&mut self, rank: u32, message: impl AsRef<str>) {
        debug!(rank, "{}", message.as_ref());
    }

    fn push(&mut self, severity: Severity, rank: u32, message: String) {
        self.entries.push(Diagnostic {
            severity,
            rank,
            message,
        });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|d| d.severity == severity).count()
    }

    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}
