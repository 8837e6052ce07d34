//! Error types for the cache crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for cache operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Storage I/O error (disk full, permission denied, ...)
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(stencil::cache::io),
        help("Check file permissions and free disk space for the cache directory")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "create")
        operation: String,
    },

    /// Configuration or validation error
    #[error("Cache configuration error: {message}")]
    #[diagnostic(code(stencil::cache::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Logical key rejected
    #[error("Invalid cache key '{key}': {reason}")]
    #[diagnostic(code(stencil::cache::invalid_key))]
    InvalidKey {
        /// The offending key
        key: String,
        /// Why it was rejected
        reason: String,
    },

    /// Not a well-formed content hash
    #[error("Invalid content hash '{value}': {reason}")]
    #[diagnostic(
        code(stencil::cache::invalid_hash),
        help("Content hashes are 64 lowercase hex characters (SHA-256)")
    )]
    InvalidHash {
        /// The offending value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Stored bytes do not match their content hash
    #[error("Blob integrity check failed: expected {expected}, computed {computed}")]
    #[diagnostic(
        code(stencil::cache::integrity),
        help("Run `stencil cache verify --repair` to drop damaged blobs")
    )]
    Integrity {
        /// Hash the blob is stored under
        expected: String,
        /// Hash of the bytes actually read
        computed: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(stencil::cache::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },

    /// Error from a shared primitive (atomic write, unit parsing, clock)
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] stencil_core::Error),
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

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

    /// Create an invalid key error
    #[must_use]
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid hash error
    #[must_use]
    pub fn invalid_hash(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHash {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// True for failures of the underlying storage medium.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Core(stencil_core::Error::Io { .. }))
    }
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_is_storage() {
        let err = Error::io(
            std::io::Error::new(std::io::ErrorKind::StorageFull, "disk full"),
            "/cache/blobs/ab/cd/abcd",
            "write",
        );
        assert!(err.is_storage());
        assert!(err.to_string().contains("/cache/blobs/ab/cd/abcd"));
    }

    #[test]
    fn test_core_io_error_is_storage() {
        let core = stencil_core::Error::io_no_path(std::io::Error::other("x"), "rename");
        let err: Error = core.into();
        assert!(err.is_storage());
    }

    #[test]
    fn test_integrity_display() {
        let err = Error::Integrity {
            expected: "aa".into(),
            computed: "bb".into(),
        };
        assert_eq!(
            err.to_string(),
            "Blob integrity check failed: expected aa, computed bb"
        );
        assert!(!err.is_storage());
    }
}
