//! `stencil.toml` loading
//!
//! Precedence, highest first: command line flags, environment, the config file,
//! built-in defaults.

use crate::errors::{CliError, CliResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use stencil_cache::{CACHE_DIR_ENV, GcOptions, GcStrategy, resolve_cache_root};
use stencil_core::{Age, ByteSize};

/// File looked up in the working directory when `--config` is not given
pub const CONFIG_FILE_NAME: &str = "stencil.toml";

/// Overrides the configured GC strategy
pub const GC_STRATEGY_ENV: &str = "STENCIL_GC_STRATEGY";

/// Parsed `stencil.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub operations: OperationsConfig,
}

/// `[cache]` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CacheConfig {
    pub dir: Option<PathBuf>,
    pub max_size: Option<ByteSize>,
    pub max_age: Option<Age>,
    pub strategy: Option<GcStrategy>,
}

/// `[operations]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OperationsConfig {
    #[serde(default = "default_true")]
    pub create_directories: bool,
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            create_directories: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

/// GC limits given on the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct GcOverrides {
    pub strategy: Option<GcStrategy>,
    pub max_size: Option<ByteSize>,
    pub max_age: Option<Age>,
}

fn non_blank_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Parse TOML text; `origin` names the file in diagnostics.
    pub fn parse(raw: &str, origin: &Path) -> CliResult<Self> {
        toml::from_str(raw).map_err(|e| CliError::config_parse_error(origin, raw, &e))
    }

    /// Load from `explicit`, else `./stencil.toml`, else defaults, then apply
    /// environment overrides.
    pub fn load(explicit: Option<&Path>) -> CliResult<Self> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let local = Path::new(CONFIG_FILE_NAME);
                if local.is_file() {
                    Self::from_file(local)?
                } else {
                    tracing::debug!("No {CONFIG_FILE_NAME} found, using defaults");
                    Self::default()
                }
            }
        };
        config.with_env()
    }

    fn from_file(path: &Path) -> CliResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CliError::file_error("read config", path, e))?;
        let config = Self::parse(&raw, path)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Apply `STENCIL_CACHE_DIR` and `STENCIL_GC_STRATEGY`.
    pub fn with_env(mut self) -> CliResult<Self> {
        if let Some(dir) = non_blank_env(CACHE_DIR_ENV) {
            self.cache.dir = Some(PathBuf::from(dir));
        }
        if let Some(strategy) = non_blank_env(GC_STRATEGY_ENV) {
            let parsed = strategy
                .parse()
                .map_err(|e: stencil_cache::Error| CliError::invalid_argument(GC_STRATEGY_ENV, e.to_string()))?;
            self.cache.strategy = Some(parsed);
        }
        Ok(self)
    }

    /// Cache root: `flag`, then the configured directory, then platform
    /// defaults. The directory is created if needed.
    pub fn cache_root(&self, flag: Option<&Path>) -> CliResult<PathBuf> {
        let explicit = flag.or(self.cache.dir.as_deref());
        Ok(resolve_cache_root(explicit)?)
    }

    /// Collector options with command line values over configured ones
    #[must_use]
    pub fn gc_options(&self, overrides: GcOverrides) -> GcOptions {
        GcOptions {
            strategy: overrides
                .strategy
                .or(self.cache.strategy)
                .unwrap_or_default(),
            max_size: overrides
                .max_size
                .or(self.cache.max_size)
                .map(ByteSize::bytes),
            max_age: overrides.max_age.or(self.cache.max_age).map(Age::duration),
        }
    }
}
