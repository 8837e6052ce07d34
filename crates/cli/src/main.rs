mod cli;
mod commands;
mod config;
mod errors;
mod output;
mod tracing;

use crate::commands::{Command, CommandContext};
use crate::config::Config;
use crate::output::Output;
use crate::tracing::TracingConfig;

#[allow(clippy::print_stderr)]
fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    if let Err(error) = run_main() {
        eprintln!("{error:?}");
        std::process::exit(1);
    }
}

fn run_main() -> miette::Result<()> {
    let cli = cli::parse();

    crate::tracing::init_tracing(TracingConfig {
        format: cli.tracing_format(),
        level: cli.level.into(),
    })?;

    let config = Config::load(cli.config.as_deref())?;
    let ctx = CommandContext {
        config,
        cache_dir: cli.cache_dir,
        output: Output::new(cli.json),
    };

    let command: Command = cli.command.into();
    commands::execute(command, &ctx)?;
    Ok(())
}
