//! Crosby - a build cache for any command
//!
//! Fingerprints the files of a project, looks the fingerprint up in a shared
//! cache and either restores the outputs of an identical earlier run or runs
//! the command and stores what it produced.

pub mod cache;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod fingerprint;
pub mod retry;
pub mod session;
pub mod telemetry;
pub mod ui;

pub use error::{CrosbyError, CrosbyResult};
