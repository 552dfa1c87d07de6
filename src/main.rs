//! Stagecraft - parts pipeline with a cached stage layer
//!
//! CLI entry point that dispatches to the step and clean commands.

use clap::Parser;
use console::style;
use stagecraft::cli::commands::{self, CommandContext};
use stagecraft::cli::{Cli, Invocation};
use stagecraft::config::{Config, ConfigManager};
use stagecraft::error::{ErrorKind, StagecraftError, StagecraftResult};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            return ExitCode::from(ErrorKind::Usage.exit_code());
        }
        Err(e) => {
            // --help and --version
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> StagecraftResult<()> {
    let config = load_config(&cli).await?;
    init_logging(cli.verbose, &config);

    let ctx = CommandContext::new(cli.file.clone(), cli.plan_only, cli.update)?;
    debug!("Working directory: {}", ctx.work_dir.display());

    match cli.invocation() {
        Invocation::Step { target, parts } => commands::step(&ctx, target, parts, &config).await,
        Invocation::Clean { parts } => commands::clean(&ctx, parts, &config).await,
    }
}

async fn load_config(cli: &Cli) -> StagecraftResult<Config> {
    let cwd = std::env::current_dir()
        .map_err(|e| StagecraftError::io("getting current directory", e))?;
    ConfigManager::discover(cli.config.as_deref(), &cwd).load().await
}

// 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("stagecraft=warn"),
        1 => EnvFilter::new("stagecraft=info"),
        _ => EnvFilter::new("stagecraft=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }
}
