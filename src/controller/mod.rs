//! Execution controller
//!
//! Drives one invocation through
//! `Fingerprinting -> Querying -> {Hitting, Missing} -> Done | Failed`.

mod capture;
mod process;
mod restore;

pub use capture::UploadPlan;
pub use process::run_command;
pub use restore::FileRestore;

use crate::cache::{lookup, CacheClient, Lookup, ResultSet};
use crate::error::CrosbyResult;
use crate::fingerprint::Fingerprint;
use crate::ui::UiContext;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

/// Controller states, logged at debug level as they are entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Fingerprinting,
    Querying,
    Hitting,
    Missing,
    Done,
    Failed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Fingerprinting => "fingerprinting",
            State::Querying => "querying",
            State::Hitting => "hitting",
            State::Missing => "missing",
            State::Done => "done",
            State::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-file results of a cache hit
#[derive(Debug)]
pub struct RestoreReport {
    pub result_id: Uuid,
    pub files: Vec<FileRestore>,
}

impl RestoreReport {
    /// Files that could not be written
    pub fn failures(&self) -> impl Iterator<Item = &FileRestore> {
        self.files.iter().filter(|file| !file.is_ok())
    }

    pub fn restored_count(&self) -> usize {
        self.files.iter().filter(|file| file.is_ok()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// How an invocation finished
#[derive(Debug)]
pub enum Outcome {
    /// Cache hit; outputs were written back
    Restored(RestoreReport),
    /// Cache hit for a command that produced no files
    NoChanges { result_id: Uuid },
    /// Cache miss; the command ran and its outputs were stored
    Cached(ResultSet),
}

impl Outcome {
    pub fn cache_hit(&self) -> bool {
        !matches!(self, Outcome::Cached(_))
    }
}

/// Runs commands through the cache
pub struct Controller {
    client: CacheClient,
    root: PathBuf,
    platform: String,
    plan: UploadPlan,
    ui: UiContext,
}

impl Controller {
    pub fn new(
        client: CacheClient,
        root: impl Into<PathBuf>,
        platform: impl Into<String>,
        plan: UploadPlan,
        ui: UiContext,
    ) -> Self {
        Self {
            client,
            root: root.into(),
            platform: platform.into(),
            plan,
            ui,
        }
    }

    /// Run `args` through the cache.
    ///
    /// Errors before the cache is touched (fingerprint, lookup, command)
    /// leave the cache unchanged.
    pub async fn run(&self, args: &[String]) -> CrosbyResult<Outcome> {
        let outcome = self.drive(args).await;
        match &outcome {
            Ok(_) => transition(State::Done),
            Err(e) => {
                transition(State::Failed);
                debug!("Run failed: {}", e);
            }
        }
        outcome
    }

    async fn drive(&self, args: &[String]) -> CrosbyResult<Outcome> {
        transition(State::Fingerprinting);
        let before = capture::snapshot(&self.root).await?;
        let fingerprint = Fingerprint::from_snapshot(&before, args, &self.platform);
        debug!("Fingerprint covers {} file(s)", fingerprint.files.len());

        transition(State::Querying);
        match lookup(self.client.index.as_ref(), &fingerprint).await? {
            Lookup::Hit(result) => {
                transition(State::Hitting);
                if result.blob_ids.is_empty() {
                    return Ok(Outcome::NoChanges {
                        result_id: result.id,
                    });
                }
                let files = restore::restore(&self.client, &self.root, &result, &self.ui).await?;
                Ok(Outcome::Restored(RestoreReport {
                    result_id: result.id,
                    files,
                }))
            }
            Lookup::Miss => {
                transition(State::Missing);
                let result = capture::capture(
                    &self.client,
                    &self.root,
                    args,
                    fingerprint,
                    &before,
                    &self.plan,
                    &self.ui,
                )
                .await?;
                Ok(Outcome::Cached(result))
            }
        }
    }
}

fn transition(state: State) {
    debug!(state = %state, "controller state");
}
