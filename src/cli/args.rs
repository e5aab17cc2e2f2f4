//! CLI argument definitions using clap derive

use crate::config::BackendKind;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Crosby - a build cache for any command
///
/// Fingerprints the working directory, restores the outputs of an earlier
/// identical run when there is one, and otherwise runs the command and
/// caches the files it produced.
#[derive(Parser, Debug)]
#[command(name = "crosby")]
#[command(author, version, about, long_about = None)]
#[command(override_usage = "crosby [OPTIONS] <COMMAND> [ARGS]...")]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, env = "CROSBY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache backend, overriding the configuration file
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Run as if started in this directory
    #[arg(short = 'C', long)]
    pub dir: Option<PathBuf>,

    /// Command to run through the cache, with its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}
