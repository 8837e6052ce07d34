use crate::commands::Command;
use crate::config::GcOverrides;
use crate::tracing::{LogLevel, TracingFormat};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use stencil_cache::GcStrategy;
use stencil_core::{Age, ByteSize};

#[derive(Parser, Debug)]
#[command(name = "stencil")]
#[command(about = "Content-addressed artifact cache and idempotent file operations for code generators")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    #[arg(long, global = true, help = "Log format (defaults to compact, or json with --json)", value_enum)]
    pub log_format: Option<TracingFormat>,

    #[arg(long, global = true, help = "Print results and logs as JSON")]
    pub json: bool,

    #[arg(long, global = true, help = "Cache directory (overrides config and STENCIL_CACHE_DIR)")]
    pub cache_dir: Option<PathBuf>,

    #[arg(long, global = true, help = "Path to stencil.toml")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Log format after applying `--json`
    pub fn tracing_format(&self) -> TracingFormat {
        match (self.log_format, self.json) {
            (Some(format), _) => format,
            (None, true) => TracingFormat::Json,
            (None, false) => TracingFormat::Compact,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Artifact cache operations")]
    Cache {
        #[command(subcommand)]
        subcommand: CacheCommands,
    },
    #[command(about = "Garbage collection")]
    Gc {
        #[command(subcommand)]
        subcommand: GcCommands,
    },
    #[command(about = "Resolve an output path template")]
    Resolve {
        template: String,
        #[arg(long = "var", help = "Template variable (key=value, dotted keys nest)", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
    },
    #[command(about = "Validate an operation descriptor")]
    Validate { descriptor: PathBuf },
    #[command(about = "Apply an operation descriptor to its target file")]
    Apply {
        descriptor: PathBuf,
        #[arg(long, conflicts_with = "content_file", required_unless_present = "content_file")]
        content: Option<String>,
        #[arg(long, help = "Read the rendered content from a file")]
        content_file: Option<PathBuf>,
        #[arg(long = "var", help = "Template variable (key=value, dotted keys nest)", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
        #[arg(long, help = "Report what would change without writing")]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    #[command(about = "Store content under a key")]
    Set {
        key: String,
        #[arg(long, conflicts_with = "content", required_unless_present = "content")]
        file: Option<PathBuf>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long = "tag", value_parser = parse_key_val)]
        tags: Vec<(String, String)>,
    },
    #[command(about = "Print the content stored under a key")]
    Get {
        key: String,
        #[arg(long, short = 'o', help = "Write to a file instead of stdout")]
        output: Option<PathBuf>,
    },
    #[command(about = "Show cache statistics")]
    Stats,
    #[command(about = "Remove a key")]
    Delete { key: String },
    #[command(about = "Remove every entry and blob")]
    Clear,
    #[command(about = "Check the index against stored blobs")]
    Verify {
        #[arg(long, help = "Drop damaged records and blobs")]
        repair: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum GcCommands {
    #[command(about = "Evict entries")]
    Collect(GcArgs),
    #[command(about = "Report what collect would evict, without changing anything")]
    Analyze(GcArgs),
}

#[derive(Args, Debug, Clone, Copy, Default)]
pub struct GcArgs {
    #[arg(long, help = "age, lru, fifo, size or hybrid")]
    pub strategy: Option<GcStrategy>,
    #[arg(long, help = "Size limit, e.g. 500MB")]
    pub max_size: Option<ByteSize>,
    #[arg(long, help = "Age limit, e.g. 30d")]
    pub max_age: Option<Age>,
}

impl From<GcArgs> for GcOverrides {
    fn from(args: GcArgs) -> Self {
        Self {
            strategy: args.strategy,
            max_size: args.max_size,
            max_age: args.max_age,
        }
    }
}

/// Split `key=value`
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

impl From<Commands> for Command {
    fn from(cmd: Commands) -> Self {
        match cmd {
            Commands::Cache { subcommand } => match subcommand {
                CacheCommands::Set {
                    key,
                    file,
                    content,
                    tags,
                } => Self::CacheSet {
                    key,
                    file,
                    content,
                    tags,
                },
                CacheCommands::Get { key, output } => Self::CacheGet { key, output },
                CacheCommands::Stats => Self::CacheStats,
                CacheCommands::Delete { key } => Self::CacheDelete { key },
                CacheCommands::Clear => Self::CacheClear,
                CacheCommands::Verify { repair } => Self::CacheVerify { repair },
            },
            Commands::Gc { subcommand } => match subcommand {
                GcCommands::Collect(args) => Self::GcCollect(args.into()),
                GcCommands::Analyze(args) => Self::GcAnalyze(args.into()),
            },
            Commands::Resolve { template, vars } => Self::Resolve { template, vars },
            Commands::Validate { descriptor } => Self::Validate { descriptor },
            Commands::Apply {
                descriptor,
                content,
                content_file,
                vars,
                dry_run,
            } => Self::Apply {
                descriptor,
                content,
                content_file,
                vars,
                dry_run,
            },
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["stencil", "cache", "stats"]).unwrap();

        assert_eq!(cli.level, LogLevel::Warn);
        assert!(!cli.json);
        assert!(cli.cache_dir.is_none());
        assert_eq!(cli.tracing_format(), TracingFormat::Compact);
        assert!(matches!(
            cli.command,
            Commands::Cache {
                subcommand: CacheCommands::Stats
            }
        ));
    }

    #[test]
    fn test_cli_log_level_parsing() {
        let cli = Cli::try_parse_from(["stencil", "--level", "debug", "cache", "stats"]).unwrap();
        assert_eq!(cli.level, LogLevel::Debug);

        let cli = Cli::try_parse_from(["stencil", "cache", "stats", "-l", "error"]).unwrap();
        assert_eq!(cli.level, LogLevel::Error);

        assert!(Cli::try_parse_from(["stencil", "--level", "loud", "cache", "stats"]).is_err());
    }

    #[test]
    fn test_json_selects_json_logs() {
        let cli = Cli::try_parse_from(["stencil", "--json", "cache", "stats"]).unwrap();
        assert_eq!(cli.tracing_format(), TracingFormat::Json);

        let cli = Cli::try_parse_from(["stencil", "--json", "--log-format", "pretty", "cache", "stats"])
            .unwrap();
        assert_eq!(cli.tracing_format(), TracingFormat::Pretty);
    }

    #[test]
    fn test_gc_args_parse_units() {
        let cli = Cli::try_parse_from([
            "stencil",
            "gc",
            "collect",
            "--strategy",
            "hybrid",
            "--max-size",
            "1MB",
            "--max-age",
            "2h",
        ])
        .unwrap();

        let Commands::Gc {
            subcommand: GcCommands::Collect(args),
        } = cli.command
        else {
            panic!("Expected gc collect");
        };
        let overrides = GcOverrides::from(args);
        assert_eq!(overrides.strategy, Some(GcStrategy::Hybrid));
        assert_eq!(overrides.max_size, Some(ByteSize(1024 * 1024)));
        assert_eq!(overrides.max_age.map(Age::duration).map(|d| d.as_secs()), Some(7200));
    }

    #[test]
    fn test_invalid_strategy_rejected() {
        assert!(Cli::try_parse_from(["stencil", "gc", "analyze", "--strategy", "random"]).is_err());
    }

    #[test]
    fn test_apply_requires_content() {
        assert!(Cli::try_parse_from(["stencil", "apply", "op.json"]).is_err());
        assert!(
            Cli::try_parse_from([
                "stencil",
                "apply",
                "op.json",
                "--content",
                "x",
                "--content-file",
                "y"
            ])
            .is_err()
        );

        let cli = Cli::try_parse_from([
            "stencil", "apply", "op.json", "--content", "x", "--var", "name=button", "--dry-run",
        ])
        .unwrap();
        let Commands::Apply { vars, dry_run, .. } = cli.command else {
            panic!("Expected apply");
        };
        assert_eq!(vars, vec![("name".to_string(), "button".to_string())]);
        assert!(dry_run);
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("a.b=c=d").unwrap(),
            ("a.b".to_string(), "c=d".to_string())
        );
        assert_eq!(parse_key_val("empty=").unwrap(), ("empty".to_string(), String::new()));
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn test_missing_subcommand() {
        assert!(Cli::try_parse_from(["stencil"]).is_err());
        assert!(Cli::try_parse_from(["stencil", "cache"]).is_err());
    }

    #[test]
    fn test_command_conversion() {
        let command: Command = Commands::Cache {
            subcommand: CacheCommands::Delete {
                key: "k".to_string(),
            },
        }
        .into();
        assert!(matches!(command, Command::CacheDelete { key } if key == "k"));
    }
}
