//! previewforge CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Build failure
//! - 4: Configuration error

use std::process::ExitCode;

use clap::Parser;
use forge_heal::HealError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, CommandError, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const BUILD_FAILURE: u8 = 3;
    pub const CONFIG_ERROR: u8 = 4;
}

fn init_logging(cli: &Cli) {
    let filter = if cli.verbose {
        EnvFilter::new("forge=debug,info")
    } else if cli.quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("forge=info,warn"))
    };

    // Logs go to stderr so --json output stays parseable.
    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match cli.command {
        Commands::Bundle(args) => commands::bundle::execute(args).await,
        Commands::Classify(args) => commands::classify::execute(args).await,
        Commands::Heal(args) => commands::heal::execute(args).await,
        Commands::Config(args) => commands::config::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(command_error) = e.downcast_ref::<CommandError>() {
        return match command_error {
            CommandError::InvalidArgs(_) => ExitCodes::INVALID_ARGS,
            CommandError::BuildFailed(_) | CommandError::HealIncomplete(_) => ExitCodes::BUILD_FAILURE,
        };
    }

    match e.downcast_ref::<HealError>() {
        Some(
            HealError::InvalidConfig(_)
            | HealError::UnsupportedFormat(_)
            | HealError::Scheduler(_)
            | HealError::Toml(_)
            | HealError::Yaml(_),
        ) => ExitCodes::CONFIG_ERROR,
        _ => ExitCodes::GENERAL_ERROR,
    }
}
