//! # stencil-codegen
//!
//! Applies rendered generator output to files on disk.
//!
//! Each output is described by an [`OperationDescriptor`] that selects exactly
//! one write mode:
//! - `write` (the default): replace or create the target
//! - `inject`: insert lines after/before a marker line, at most once
//! - `append` / `prepend`: add to the end or start of the target
//! - `lineAt`: insert at a 1-indexed line
//!
//! The flow is always resolve, validate, apply:
//!
//! ```rust,no_run
//! use stencil_codegen::{OperationDescriptor, OperationEngine, PathResolver};
//! use serde_json::json;
//!
//! # fn main() -> stencil_codegen::Result<()> {
//! let context = json!({ "name": "button" });
//! let descriptor: OperationDescriptor =
//!     serde_json::from_value(json!({ "to": "src/{{ name }}.rs" }))?;
//!
//! let path = <PathResolver>::default().resolve(&descriptor.to, &context)?;
//! let result = OperationEngine::new().apply(&path, "pub struct Button;\n", &descriptor, &context)?;
//! assert!(result.changed);
//! # Ok(())
//! # }
//! ```
//!
//! Every mutation is atomic (temp file then rename) and runs inside a
//! per-target critical section.

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

pub mod condition;
pub mod descriptor;
pub mod engine;
pub mod path;
pub mod transform;
pub mod validate;

pub use condition::{ConditionContext, ConditionEvaluator, DefaultConditionEvaluator};
pub use descriptor::{OperationDescriptor, SkipIf, WriteMode};
pub use engine::{OperationEngine, OperationResult, OperationStatus};
pub use path::{PathResolver, PlaceholderRenderer, Renderer, normalize_path};
pub use validate::{ValidationReport, validate_operation};

use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while resolving, validating or applying an operation
#[derive(Error, Debug, Diagnostic)]
pub enum CodegenError {
    /// The descriptor failed validation; nothing was touched
    #[error("Invalid operation: {}", errors.join("; "))]
    #[diagnostic(
        code(stencil::codegen::validation),
        help("Select at most one of inject, append, prepend or lineAt")
    )]
    Validation {
        /// Every validation error found
        errors: Vec<String>,
    },

    /// The target path template could not be turned into a path
    #[error("Cannot resolve path '{template}': {message}")]
    #[diagnostic(code(stencil::codegen::path_resolution))]
    PathResolution {
        /// Template as given
        template: String,
        /// What went wrong
        message: String,
    },

    /// The renderer rejected a template
    #[error("Render error: {0}")]
    #[diagnostic(code(stencil::codegen::render))]
    Render(String),

    /// A `skipIf` condition could not be evaluated
    #[error("Invalid skipIf condition '{expression}': {message}")]
    #[diagnostic(code(stencil::codegen::condition))]
    Condition {
        /// The condition as written
        expression: String,
        /// What went wrong
        message: String,
    },

    /// The operation could not be applied; the target is untouched
    #[error("Cannot apply operation to {}: {message}", path.display())]
    #[diagnostic(code(stencil::codegen::apply))]
    Apply {
        /// Target path
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// I/O error while reading or preparing a target
    #[error("I/O {operation} failed: {}", path.display())]
    #[diagnostic(
        code(stencil::codegen::io),
        help("Check that the target directory exists and is writable")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path involved
        path: PathBuf,
        /// Operation that failed
        operation: String,
    },

    /// Error from a shared primitive (atomic write, chmod)
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] stencil_core::Error),

    /// JSON error while loading a descriptor
    #[error("JSON error: {0}")]
    #[diagnostic(code(stencil::codegen::json))]
    Json(#[from] serde_json::Error),
}

impl CodegenError {
    /// Create an apply error
    #[must_use]
    pub fn apply(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Apply {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(source: std::io::Error, path: impl AsRef<Path>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: path.as_ref().to_path_buf(),
            operation: operation.into(),
        }
    }

    /// Create a path resolution error
    #[must_use]
    pub fn path_resolution(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PathResolution {
            template: template.into(),
            message: message.into(),
        }
    }

    /// True for failures raised while mutating a target
    #[must_use]
    pub const fn is_apply(&self) -> bool {
        matches!(self, Self::Apply { .. } | Self::Io { .. } | Self::Core(_))
    }
}

/// Result type for codegen operations
pub type Result<T> = std::result::Result<T, CodegenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let error = CodegenError::Validation {
            errors: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(error.to_string(), "Invalid operation: a; b");
        assert!(!error.is_apply());
    }

    #[test]
    fn test_apply_error_display() {
        let error = CodegenError::apply("src/lib.rs", "inject target does not exist");
        assert_eq!(
            error.to_string(),
            "Cannot apply operation to src/lib.rs: inject target does not exist"
        );
        assert!(error.is_apply());
    }

    #[test]
    fn test_path_resolution_display() {
        let error = CodegenError::path_resolution("{{ x }}", "undefined variable 'x'");
        assert_eq!(
            error.to_string(),
            "Cannot resolve path '{{ x }}': undefined variable 'x'"
        );
    }

    #[test]
    fn test_json_error_from() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ bad").unwrap_err();
        let error: CodegenError = json_err.into();
        assert!(error.to_string().starts_with("JSON error:"));
    }
}
