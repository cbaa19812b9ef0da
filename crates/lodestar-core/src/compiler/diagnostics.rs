//! Compile-time diagnostics.
//!
//! The lowering pass reports structural errors here and keeps going, so a
//! single run surfaces every bad `break`/`continue`/label in a script.

use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Structural errors found while lowering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoweringError {
    /// `break` without a label outside any loop or switch
    #[error("unlabelled break must be inside loop or switch")]
    BreakOutside,

    /// `continue` without a label outside any loop
    #[error("continue must be inside loop")]
    ContinueOutside,

    /// `continue L` where `L` does not label an iteration statement
    #[error("continue can only use labels of iteration statements")]
    ContinueNonLoop,

    /// Jump to a label that is not in scope
    #[error("undefined label '{0}'")]
    UndefinedLabel(String),

    /// Label nested inside a label of the same name
    #[error("duplicate label '{0}'")]
    DuplicateLabel(String),
}

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Compilation continues and produces a unit
    Warning,
    /// No unit is produced
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// A message tied to a source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Human readable message
    pub message: String,
    /// Source file, if known
    pub source_name: Option<String>,
    /// Line, if known
    pub line: Option<u32>,
    /// Severity
    pub severity: Severity,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = self.source_name.as_deref().unwrap_or("<script>");
        match self.line {
            Some(line) => write!(f, "{}:{}: {}: {}", source, line, self.severity, self.message),
            None => write!(f, "{}: {}: {}", source, self.severity, self.message),
        }
    }
}

/// Collector for diagnostics.
///
/// Recording stops after `limit` entries; later reports are only counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    limit: usize,
    dropped: usize,
    errors: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::with_limit(usize::MAX)
    }
}

impl Diagnostics {
    /// Creates an unbounded collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collector recording at most `limit` entries.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            items: Vec::new(),
            limit,
            dropped: 0,
            errors: 0,
        }
    }

    /// Records a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        warn!(
            source = diagnostic.source_name.as_deref().unwrap_or("<script>"),
            line = diagnostic.line,
            severity = %diagnostic.severity,
            "{}",
            diagnostic.message
        );
        if diagnostic.severity == Severity::Error {
            self.errors += 1;
        }
        if self.items.len() < self.limit {
            self.items.push(diagnostic);
        } else {
            self.dropped += 1;
        }
    }

    /// Records an error.
    pub fn error(&mut self, message: impl Into<String>, source_name: Option<&str>, line: Option<u32>) {
        self.push(Diagnostic {
            message: message.into(),
            source_name: source_name.map(str::to_string),
            line,
            severity: Severity::Error,
        });
    }

    /// Records a warning.
    pub fn warning(&mut self, message: impl Into<String>, source_name: Option<&str>, line: Option<u32>) {
        self.push(Diagnostic {
            message: message.into(),
            source_name: source_name.map(str::to_string),
            line,
            severity: Severity::Warning,
        });
    }

    /// Returns true if any error was reported, recorded or not.
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// Number of errors reported.
    pub fn error_count(&self) -> usize {
        self.errors
    }

    /// Number of reports past the recording limit.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Number of recorded diagnostics.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Recorded diagnostics in report order.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", d)?;
        }
        if self.dropped > 0 {
            write!(f, "\n... and {} more", self.dropped)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_line() {
        let mut diags = Diagnostics::new();
        diags.error(LoweringError::BreakOutside.to_string(), Some("a.js"), Some(3));
        assert_eq!(
            diags.to_string(),
            "a.js:3: error: unlabelled break must be inside loop or switch"
        );
        assert!(diags.has_errors());
    }

    #[test]
    fn test_warnings_are_not_errors() {
        let mut diags = Diagnostics::new();
        diags.warning("unused", None, None);
        assert!(!diags.has_errors());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.iter().next().unwrap().to_string(), "<script>: warning: unused");
    }

    #[test]
    fn test_limit_counts_dropped() {
        let mut diags = Diagnostics::with_limit(2);
        for _ in 0..5 {
            diags.error("bad", None, Some(1));
        }
        assert_eq!(diags.len(), 2);
        assert_eq!(diags.dropped(), 3);
        assert_eq!(diags.error_count(), 5);
        assert!(diags.to_string().ends_with("... and 3 more"));
    }

    #[test]
    fn test_lowering_error_messages() {
        assert_eq!(LoweringError::UndefinedLabel("L".into()).to_string(), "undefined label 'L'");
        assert_eq!(LoweringError::DuplicateLabel("L".into()).to_string(), "duplicate label 'L'");
        assert_eq!(
            LoweringError::ContinueNonLoop.to_string(),
            "continue can only use labels of iteration statements"
        );
    }
}
