use std::fmt::Display;
use std::ops::Range;

use crate::tokens::Location;

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
}

/// A machine-applicable edit attached to a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suggestion {
    /// Append text at the end of the offending span.
    Append(String),
    /// Replace a byte range of the source with new text.
    Replace(Range<usize>, String),
}

/// A problem found anywhere in the pipeline, pinned to a source location.
///
/// Diagnostics never abort a compilation; they accumulate in sinks and are
/// handed back in source order once a compile finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub message: String,
    pub level: Level,
    pub location: Location,
    pub suggestion: Option<Suggestion>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, location: Location) -> Self {
        Self {
            message: message.into(),
            level: Level::Error,
            location,
            suggestion: None,
        }
    }

    pub fn warning(message: impl Into<String>, location: Location) -> Self {
        Self {
            message: message.into(),
            level: Level::Warning,
            location,
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: Suggestion) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.level {
            Level::Error => "error",
            Level::Warning => "warning",
        };
        write!(
            f,
            "{}:{}: {}: {}",
            self.location.line, self.location.column, level, self.message
        )
    }
}

/// Sort diagnostics into source order. Ties keep insertion order.
pub fn sort_by_location(diagnostics: &mut Vec<Diagnostic>) {
    diagnostics.sort_by_key(|d| (d.location.start, d.location.end));
}
