//! Crosby - a build cache for any command
//!
//! CLI entry point.

use clap::Parser;
use console::style;
use crosby::cli::Cli;
use crosby::config::{Config, ConfigManager};
use crosby::error::{CrosbyError, CrosbyResult};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CrosbyResult<()> {
    let cli = Cli::parse();

    if cli.command.is_empty() {
        println!("{} Must Specify Command to Run", style("Error:").red().bold());
        println!("Usage: crosby <command>");
        return Ok(());
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = config_manager.load().await?;
    if let Some(backend) = cli.backend {
        config.backend.kind = backend;
    }

    init_logging(cli.verbose, &config);
    debug!("Loaded configuration from {}", config_manager.path().display());

    let root = resolve_root(cli.dir)?;
    crosby::cli::execute(&cli.command, &root, &config).await
}

/// 0 = warn (progress output only), 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("crosby=warn"),
        1 => EnvFilter::new("crosby=info"),
        _ => EnvFilter::new("crosby=debug"),
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

fn resolve_root(dir: Option<PathBuf>) -> CrosbyResult<PathBuf> {
    let dir = match dir {
        Some(dir) => dir,
        None => std::env::current_dir()
            .map_err(|e| CrosbyError::io("getting current directory", e))?,
    };
    dir.canonicalize()
        .map_err(|e| CrosbyError::io(format!("resolving {}", dir.display()), e))
}
