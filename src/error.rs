//! Error types for chroma

use thiserror::Error;

/// Result type alias for highlighting operations
pub type Result<T> = std::result::Result<T, HighlightError>;

/// Highlighting error types
///
/// Only loading and lookup fail with errors. Scanning and chunking never
/// do: an unresolvable rule or style degrades to a coarser result instead.
#[derive(Error, Debug)]
pub enum HighlightError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error in grammar '{name}': {reason}")]
    Grammar { name: String, reason: String },

    #[error("error in theme '{name}': {reason}")]
    Theme { name: String, reason: String },

    #[error("no grammar registered for mime type: {0}")]
    UnknownMimeType(String),

    #[error("no theme registered under name: {0}")]
    UnknownTheme(String),
}

impl HighlightError {
    /// Build a grammar-load error with a descriptive reason
    pub fn grammar(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Grammar {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a theme-load error with a descriptive reason
    pub fn theme(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Theme {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}
