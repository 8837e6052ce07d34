//! CLI error types
//!
//! Library errors pass through transparently so their miette codes and help
//! text reach the terminal unchanged.

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::{Diagnostic, SourceSpan};
use std::path::PathBuf;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error("Configuration parsing failed: {message}")]
    #[diagnostic(code(stencil::cli::config_parse_error))]
    ConfigParse {
        config_file: PathBuf,
        message: String,
        #[source_code]
        src: String,
        #[label("error occurred here")]
        error_span: Option<SourceSpan>,
        #[help]
        help_text: Option<String>,
    },

    #[error("Invalid value for {argument}: {message}")]
    #[diagnostic(
        code(stencil::cli::invalid_argument),
        help("Run 'stencil --help' to see available options")
    )]
    InvalidArgument { argument: String, message: String },

    #[error("Failed to {operation} {}", path.display())]
    #[diagnostic(
        code(stencil::cli::file_error),
        help("Check file permissions and ensure the path exists")
    )]
    FileError {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No cache entry for key '{key}'")]
    #[diagnostic(
        code(stencil::cli::not_found),
        help("Run 'stencil cache stats' to inspect the cache")
    )]
    NotFound { key: String },

    #[error("Cache integrity check found {problems} problem(s)")]
    #[diagnostic(
        code(stencil::cli::cache_damaged),
        help("Run 'stencil cache verify --repair' to drop damaged records and blobs")
    )]
    CacheDamaged { problems: usize },

    #[error("Descriptor {} is invalid", path.display())]
    #[diagnostic(code(stencil::cli::invalid_descriptor))]
    InvalidDescriptor {
        path: PathBuf,
        #[help]
        errors: String,
    },

    #[error("Failed to write output")]
    #[diagnostic(code(stencil::cli::output))]
    Output(#[source] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] stencil_core::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] stencil_cache::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Codegen(#[from] stencil_codegen::CodegenError),
}

impl CliError {
    pub fn config_parse_error(
        config_file: impl Into<PathBuf>,
        src: impl Into<String>,
        error: &toml::de::Error,
    ) -> Self {
        Self::ConfigParse {
            config_file: config_file.into(),
            message: error.message().to_string(),
            src: src.into(),
            error_span: error.span().map(SourceSpan::from),
            help_text: Some("Keys are camelCase, e.g. [cache] maxSize = \"1GB\"".to_string()),
        }
    }

    pub fn invalid_argument(argument: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            message: message.into(),
        }
    }

    pub fn file_error(
        operation: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::FileError {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
