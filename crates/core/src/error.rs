//! Error types for the core crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for core primitives
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// I/O error during a filesystem primitive
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(stencil::core::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "rename", "chmod")
        operation: String,
    },

    /// A size string could not be parsed
    #[error("Invalid size '{input}': {message}")]
    #[diagnostic(
        code(stencil::core::invalid_size),
        help("Use <number><unit> with unit one of B, KB, MB, GB (e.g. 500MB)")
    )]
    InvalidSize {
        /// Raw input
        input: String,
        /// What was wrong with it
        message: String,
    },

    /// A duration string could not be parsed
    #[error("Invalid duration '{input}': {message}")]
    #[diagnostic(
        code(stencil::core::invalid_duration),
        help("Use <number><unit> with unit one of ms, s, m, h, d (e.g. 30d)")
    )]
    InvalidDuration {
        /// Raw input
        input: String,
        /// What was wrong with it
        message: String,
    },

    /// `SOURCE_DATE_EPOCH` is set but not a valid timestamp
    #[error("Invalid SOURCE_DATE_EPOCH '{value}'")]
    #[diagnostic(
        code(stencil::core::source_date_epoch),
        help("SOURCE_DATE_EPOCH must be a non-negative integer number of seconds")
    )]
    InvalidEpoch {
        /// Raw environment value
        value: String,
    },
}

impl Error {
    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Create an invalid size error
    #[must_use]
    pub fn invalid_size(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSize {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Create an invalid duration error
    #[must_use]
    pub fn invalid_duration(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDuration {
            input: input.into(),
            message: message.into(),
        }
    }

    /// The underlying I/O error, if this is one
    #[must_use]
    pub fn as_io(&self) -> Option<&std::io::Error> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for core primitives
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_with_path() {
        let err = Error::io(
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            "/tmp/target.txt",
            "rename",
        );
        assert_eq!(err.to_string(), "I/O rename failed: /tmp/target.txt");
        assert!(err.as_io().is_some());
    }

    #[test]
    fn test_io_error_display_without_path() {
        let err = Error::io_no_path(std::io::Error::other("boom"), "sync");
        assert_eq!(err.to_string(), "I/O sync failed");
    }

    #[test]
    fn test_invalid_size_display() {
        let err = Error::invalid_size("12XB", "unknown unit 'XB'");
        assert_eq!(err.to_string(), "Invalid size '12XB': unknown unit 'XB'");
        assert!(err.as_io().is_none());
    }
}
