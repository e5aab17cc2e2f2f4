//! Blob store for captured output files
//!
//! Blobs are named `<result-set-id>:<relative-path>` so many result sets
//! share one namespace and a reader can recover the path by stripping the
//! prefix.

use crate::error::CrosbyResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncRead;
use uuid::Uuid;

/// Byte stream into or out of the blob store
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Opaque identifier returned by [`BlobStore::put`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(String);

impl BlobId {
    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BlobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BlobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stored blob metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    pub id: BlobId,
    pub name: String,
}

impl BlobInfo {
    /// Relative output path encoded in the name, if it belongs to `result_id`
    pub fn relative_path(&self, result_id: &Uuid) -> Option<&str> {
        self.name.strip_prefix(&format!("{}:", result_id))
    }
}

/// Name under which an output file of `result_id` is stored
pub fn blob_name(result_id: &Uuid, relative: &str) -> String {
    format!("{}:{}", result_id, relative)
}

/// Resolve a stored relative path under `root`, refusing anything that
/// would escape it.
pub fn resolve_output_path(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    if relative.as_os_str().is_empty() {
        return None;
    }
    let safe = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    safe.then(|| root.join(relative))
}

/// Content store for output files
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stream `reader` into a new blob called `name` and return its id.
    /// Returns only after the content is fully stored.
    async fn put(&self, name: &str, reader: BlobReader) -> CrosbyResult<BlobId>;

    /// Open a stored blob for reading
    async fn get(&self, id: &BlobId) -> CrosbyResult<BlobReader>;

    /// Metadata of every stored blob whose id is in `ids`. Unknown ids are
    /// left out.
    async fn get_many(&self, ids: &[BlobId]) -> CrosbyResult<Vec<BlobInfo>>;
}
