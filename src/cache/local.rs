//! Directory-backed cache
//!
//! Layout under the root (which may live on a shared mount):
//!
//! | Path | Content |
//! |------|---------|
//! | `index.jsonl` | One result-set document per line, append-only |
//! | `blobs/<id>` | Blob bytes |
//! | `blobs/<id>.json` | Blob metadata (`id`, `name`) |
//!
//! Blob bytes are written to a temporary file and renamed into place, so a
//! blob is either fully present or absent.

use crate::cache::blob::{BlobId, BlobInfo, BlobReader, BlobStore};
use crate::cache::index::{CacheIndex, ResultSet};
use crate::error::{CrosbyError, CrosbyResult};
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

const INDEX_FILE: &str = "index.jsonl";
const BLOBS_DIR: &str = "blobs";

/// Cache stored in a directory tree
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Use `root` as the cache directory; it is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn blobs_dir(&self) -> PathBuf {
        self.root.join(BLOBS_DIR)
    }

    fn blob_path(&self, id: &BlobId) -> PathBuf {
        self.blobs_dir().join(id.as_str())
    }

    fn meta_path(&self, id: &BlobId) -> PathBuf {
        self.blobs_dir().join(format!("{}.json", id))
    }
}

/// Failures of the backing directory surface as connectivity errors
fn unreachable(context: impl std::fmt::Display, e: std::io::Error) -> CrosbyError {
    CrosbyError::Connectivity(format!("{}: {}", context, e))
}

/// Ids come from the index file; refuse anything that is not a bare file name
fn valid_id(id: &BlobId) -> bool {
    let s = id.as_str();
    !s.is_empty() && !s.contains(['/', '\\']) && s != "." && s != ".."
}

#[async_trait]
impl CacheIndex for LocalStore {
    async fn find(&self, query: &Fingerprint) -> CrosbyResult<Vec<ResultSet>> {
        let path = self.index_path();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No index at {}, treating as empty", path.display());
                return Ok(vec![]);
            }
            Err(e) => return Err(unreachable(format!("reading {}", path.display()), e)),
        };

        let mut matches = vec![];
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ResultSet>(line) {
                Ok(result) if result.fingerprint.covers(query) => matches.push(result),
                Ok(_) => {}
                Err(e) => warn!("Skipping corrupt index line {}: {}", lineno + 1, e),
            }
        }
        Ok(matches)
    }

    async fn insert(&self, result: &ResultSet) -> CrosbyResult<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| unreachable(format!("creating {}", self.root.display()), e))?;

        let mut line = serde_json::to_string(result)?;
        line.push('\n');

        let path = self.index_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| unreachable(format!("opening {}", path.display()), e))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| unreachable(format!("appending to {}", path.display()), e))?;
        file.flush()
            .await
            .map_err(|e| unreachable(format!("flushing {}", path.display()), e))?;

        debug!("Inserted result set {}", result.id);
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn put(&self, name: &str, mut reader: BlobReader) -> CrosbyResult<BlobId> {
        let dir = self.blobs_dir();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| unreachable(format!("creating {}", dir.display()), e))?;

        let id = BlobId::from(Uuid::new_v4().simple().to_string());
        let tmp = dir.join(format!("{}.tmp", id));

        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| unreachable(format!("creating {}", tmp.display()), e))?;
        let copied = tokio::io::copy(&mut reader, &mut file).await;
        let flushed = match copied {
            Ok(_) => file.flush().await,
            Err(e) => Err(e),
        };
        drop(file);
        if let Err(e) = flushed {
            let _ = fs::remove_file(&tmp).await;
            return Err(unreachable(format!("writing blob for {}", name), e));
        }

        let meta = serde_json::to_vec(&BlobInfo {
            id: id.clone(),
            name: name.to_string(),
        })?;
        let meta_path = self.meta_path(&id);
        fs::write(&meta_path, meta)
            .await
            .map_err(|e| unreachable(format!("writing {}", meta_path.display()), e))?;

        fs::rename(&tmp, self.blob_path(&id))
            .await
            .map_err(|e| unreachable(format!("finalizing blob {}", id), e))?;

        Ok(id)
    }

    async fn get(&self, id: &BlobId) -> CrosbyResult<BlobReader> {
        if !valid_id(id) {
            return Err(CrosbyError::BlobNotFound(id.to_string()));
        }
        let path = self.blob_path(id);
        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(CrosbyError::BlobNotFound(id.to_string()))
            }
            Err(e) => Err(unreachable(format!("opening {}", path.display()), e)),
        }
    }

    async fn get_many(&self, ids: &[BlobId]) -> CrosbyResult<Vec<BlobInfo>> {
        let mut infos = Vec::with_capacity(ids.len());
        for id in ids.iter().filter(|id| valid_id(id)) {
            let blob_path = self.blob_path(id);
            let present = fs::try_exists(&blob_path)
                .await
                .map_err(|e| unreachable(format!("checking {}", blob_path.display()), e))?;
            if !present {
                continue;
            }
            let meta_path = self.meta_path(id);
            match fs::read(&meta_path).await {
                Ok(bytes) => infos.push(serde_json::from_slice::<BlobInfo>(&bytes)?),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(unreachable(format!("reading {}", meta_path.display()), e)),
            }
        }
        Ok(infos)
    }
}
