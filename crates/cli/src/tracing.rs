//! Log setup for the stencil binary
//!
//! Logs go to stderr so command output on stdout stays machine readable. Every
//! run carries a correlation id.

use std::io;
use std::sync::OnceLock;
use tracing::Level;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Shape of log lines on stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TracingFormat {
    /// One line per record
    Compact,
    /// Multi-line, with targets
    Pretty,
    /// One JSON object per record
    Json,
}

/// `--level` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub format: TracingFormat,
    pub level: Level,
}

/// Correlation id shared by every record of this run
pub fn correlation_id() -> Uuid {
    static CORRELATION_ID: OnceLock<Uuid> = OnceLock::new();
    *CORRELATION_ID.get_or_init(Uuid::new_v4)
}

// `level` for the binary, every library crate, and the `stencil::*` event targets.
fn default_directive(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    ["stencil", "stencil_cli", "stencil_core", "stencil_cache", "stencil_codegen", "stencil_events"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `config.level`.
pub fn init_tracing(config: TracingConfig) -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(config.level)))
        .map_err(|e| miette::miette!("Failed to create tracing filter: {e}"))?;

    let fmt = tracing_subscriber::fmt::layer().with_writer(io::stderr);
    let layer = match config.format {
        TracingFormat::Compact => fmt.compact().with_target(false).boxed(),
        TracingFormat::Pretty => fmt.pretty().boxed(),
        TracingFormat::Json => fmt.json().with_current_span(true).with_span_list(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| miette::miette!("Failed to install tracing subscriber: {e}"))?;

    tracing::debug!(
        correlation_id = %correlation_id(),
        version = env!("CARGO_PKG_VERSION"),
        format = ?config.format,
        "Tracing initialized"
    );
    Ok(())
}

/// Span wrapping one command run
#[macro_export]
macro_rules! command_span {
    ($command:expr) => {
        tracing::info_span!(
            "command",
            command = %$command,
            correlation_id = %$crate::tracing::correlation_id(),
            start_time = %chrono::Utc::now().to_rfc3339(),
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_is_stable() {
        assert_eq!(correlation_id(), correlation_id());
    }

    #[test]
    fn test_default_directive_covers_every_crate() {
        let directive = default_directive(Level::INFO);
        assert!(directive.starts_with("stencil=info,"));
        assert!(directive.contains("stencil_cache=info"));
        assert!(EnvFilter::try_new(directive).is_ok());
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }
}
