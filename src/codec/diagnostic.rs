//! Diagnostic types for document parsing.
//!
//! Parsing never fails on a single construct. Anything the parser skips is reported here so a
//! host can surface it (squiggles, a problems panel) without the index losing the document.

use crate::properties::Position;
use std::{
    fmt::{Display, Formatter},
    ops::Range,
};

/// Diagnostic information produced during document parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseDiagnostic {
    /// A mention-like construct that could not be read (unterminated `[[`, empty target) and was
    /// skipped.
    Malformed {
        message: String,
        range: Range<usize>,
        position: Position,
    },

    /// A recoverable problem with document-level data, e.g. unreadable frontmatter.
    Warning(String),

    /// An informational message about the parse
    Info(String),
}

impl ParseDiagnostic {
    pub fn malformed(message: impl Into<String>, range: Range<usize>, position: Position) -> Self {
        ParseDiagnostic::Malformed {
            message: message.into(),
            range,
            position,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, ParseDiagnostic::Malformed { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            ParseDiagnostic::Malformed { message, .. } => message,
            ParseDiagnostic::Warning(message) | ParseDiagnostic::Info(message) => message,
        }
    }
}

impl Display for ParseDiagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseDiagnostic::Malformed {
                message, position, ..
            } => write!(f, "{position}: {message}"),
            ParseDiagnostic::Warning(message) => write!(f, "warning: {message}"),
            ParseDiagnostic::Info(message) => write!(f, "info: {message}"),
        }
    }
}
