//! Non-fatal diagnostic collection.
//!
//! Local errors (§7) don't abort the pass; they're pushed here and reported
//! once at the end, the way the teacher's `main.rs` collects unknown tags and
//! block types while walking and prints one summary at the end.

use crate::error::CompileError;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single non-fatal finding, attached to the chain or record that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Dotted chain path (`tcname`) or record PV this diagnostic is about, if any.
    pub location: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}: {} ({})", self.severity, self.message, loc),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Accumulates diagnostics across an entire compilation pass.
///
/// `allow_errors` promotes what would otherwise be fatal-for-one-chain
/// errors into warnings, matching spec §7's "allow_errors mode promotes all
/// non-fatal errors to warnings."
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    allow_errors: bool,
}

impl Diagnostics {
    pub fn new(allow_errors: bool) -> Self {
        Self {
            entries: Vec::new(),
            allow_errors,
        }
    }

    pub fn allow_errors(&self) -> bool {
        self.allow_errors
    }

    pub fn push_error(&mut self, err: &CompileError) {
        let severity = if self.allow_errors {
            Severity::Warning
        } else {
            Severity::Error
        };
        self.entries.push(Diagnostic {
            severity,
            message: err.to_string(),
            location: err.tcname().map(str::to_string),
        });
    }

    pub fn push(&mut self, severity: Severity, message: impl Into<String>, location: Option<String>) {
        self.entries.push(Diagnostic {
            severity,
            message: message.into(),
            location,
        });
    }

    pub fn warn(&mut self, message: impl Into<String>, location: Option<String>) {
        self.push(Severity::Warning, message, location);
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}
