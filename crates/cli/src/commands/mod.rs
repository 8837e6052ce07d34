pub mod cache;
pub mod gc;
pub mod operations;

use crate::config::{Config, GcOverrides};
use crate::errors::CliResult;
use crate::output::Output;
use serde_json::{Map, Value};
use std::path::PathBuf;
use stencil_cache::ArtifactCache;
use stencil_core::clock_from_env;

#[derive(Debug, Clone)]
pub enum Command {
    CacheSet {
        key: String,
        file: Option<PathBuf>,
        content: Option<String>,
        tags: Vec<(String, String)>,
    },
    CacheGet {
        key: String,
        output: Option<PathBuf>,
    },
    CacheStats,
    CacheDelete {
        key: String,
    },
    CacheClear,
    CacheVerify {
        repair: bool,
    },
    GcCollect(GcOverrides),
    GcAnalyze(GcOverrides),
    Resolve {
        template: String,
        vars: Vec<(String, String)>,
    },
    Validate {
        descriptor: PathBuf,
    },
    Apply {
        descriptor: PathBuf,
        content: Option<String>,
        content_file: Option<PathBuf>,
        vars: Vec<(String, String)>,
        dry_run: bool,
    },
}

impl Command {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CacheSet { .. } => "cache set",
            Self::CacheGet { .. } => "cache get",
            Self::CacheStats => "cache stats",
            Self::CacheDelete { .. } => "cache delete",
            Self::CacheClear => "cache clear",
            Self::CacheVerify { .. } => "cache verify",
            Self::GcCollect(_) => "gc collect",
            Self::GcAnalyze(_) => "gc analyze",
            Self::Resolve { .. } => "resolve",
            Self::Validate { .. } => "validate",
            Self::Apply { .. } => "apply",
        }
    }
}

/// Settings shared by every command in one run
#[derive(Debug)]
pub struct CommandContext {
    pub config: Config,
    pub cache_dir: Option<PathBuf>,
    pub output: Output,
}

impl CommandContext {
    /// Open the configured cache with the environment's clock
    pub fn open_cache(&self) -> CliResult<ArtifactCache> {
        let root = self.config.cache_root(self.cache_dir.as_deref())?;
        let clock = clock_from_env()?;
        tracing::debug!(root = %root.display(), "Opening artifact cache");
        Ok(ArtifactCache::open(root)?.with_clock(clock))
    }
}

pub fn execute(command: Command, ctx: &CommandContext) -> CliResult<()> {
    let span = crate::command_span!(command.name());
    let _enter = span.enter();

    match command {
        Command::CacheSet {
            key,
            file,
            content,
            tags,
        } => cache::set(ctx, &key, file, content, tags),
        Command::CacheGet { key, output } => cache::get(ctx, &key, output),
        Command::CacheStats => cache::stats(ctx),
        Command::CacheDelete { key } => cache::delete(ctx, &key),
        Command::CacheClear => cache::clear(ctx),
        Command::CacheVerify { repair } => cache::verify(ctx, repair),
        Command::GcCollect(overrides) => gc::collect(ctx, overrides),
        Command::GcAnalyze(overrides) => gc::analyze(ctx, overrides),
        Command::Resolve { template, vars } => operations::resolve(ctx, &template, &vars),
        Command::Validate { descriptor } => operations::validate(ctx, &descriptor),
        Command::Apply {
            descriptor,
            content,
            content_file,
            vars,
            dry_run,
        } => operations::apply(ctx, &descriptor, content, content_file, &vars, dry_run),
    }
}

/// Build a variable context from `--var` pairs.
///
/// Dotted keys nest (`user.name=Ada`). Values that parse as JSON scalars
/// (`true`, `3`) keep their type; everything else is a string.
pub fn variables(pairs: &[(String, String)]) -> Value {
    let mut root = Map::new();
    for (key, raw) in pairs {
        let value = match serde_json::from_str::<Value>(raw) {
            Ok(parsed @ (Value::Bool(_) | Value::Number(_) | Value::Null)) => parsed,
            _ => Value::String(raw.clone()),
        };
        insert_dotted(&mut root, key, value);
    }
    Value::Object(root)
}

fn insert_dotted(map: &mut Map<String, Value>, key: &str, value: Value) {
    match key.split_once('.') {
        None => {
            map.insert(key.to_string(), value);
        }
        Some((head, rest)) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(inner) = child {
                insert_dotted(inner, rest, value);
            }
        }
    }
}
