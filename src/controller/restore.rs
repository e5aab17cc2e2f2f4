//! Hit path: write cached outputs back onto disk
//!
//! Every file is restored by its own task. A failing file never cancels its
//! siblings; the caller gets one result per file.

use crate::cache::{resolve_output_path, BlobId, BlobInfo, CacheClient, ResultSet};
use crate::error::{CrosbyError, CrosbyResult};
use crate::ui::{TransferProgress, UiContext};
use futures_util::future::join_all;
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Result of restoring one cached file
#[derive(Debug)]
pub struct FileRestore {
    /// Relative path (or blob id when the path is unknown)
    pub path: String,
    pub result: CrosbyResult<()>,
}

impl FileRestore {
    /// Whether the file was written
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Restore every blob of `result` under `root`.
///
/// Returns an empty list when the result set has no outputs. Only a failure
/// to list the blobs is fatal; everything after that is reported per file.
pub async fn restore(
    client: &CacheClient,
    root: &Path,
    result: &ResultSet,
    ctx: &UiContext,
) -> CrosbyResult<Vec<FileRestore>> {
    if result.blob_ids.is_empty() {
        return Ok(vec![]);
    }

    let infos = client.blobs.get_many(&result.blob_ids).await?;
    let mut outcomes = missing_blobs(&result.blob_ids, &infos);
    if !outcomes.is_empty() {
        warn!(
            "{} of {} cached files are missing from the blob store",
            outcomes.len(),
            result.blob_ids.len()
        );
    }

    let progress = TransferProgress::new(ctx, "Restoring from cache", result.blob_ids.len() as u64);
    for missing in &outcomes {
        if let Err(ref e) = missing.result {
            progress.file_failed(&missing.path, &e.to_string());
        }
    }

    let tasks = infos.into_iter().map(|info| {
        let client = client.clone();
        let root = root.to_path_buf();
        let progress = progress.clone();
        let result_id = result.id;
        let fallback = info.id.to_string();

        let handle = tokio::spawn(async move {
            let restored = restore_one(&client, &root, &result_id, &info).await;
            match &restored.result {
                Ok(()) => progress.file_done(&restored.path),
                Err(e) => progress.file_failed(&restored.path, &e.to_string()),
            }
            restored
        });
        async move {
            handle.await.unwrap_or_else(|e| FileRestore {
                path: fallback,
                result: Err(CrosbyError::Internal(format!("restore task failed: {}", e))),
            })
        }
    });

    outcomes.extend(join_all(tasks).await);
    progress.finish();
    Ok(outcomes)
}

/// Referenced blobs the store did not return
fn missing_blobs(wanted: &[BlobId], found: &[BlobInfo]) -> Vec<FileRestore> {
    let present: HashSet<&BlobId> = found.iter().map(|info| &info.id).collect();
    wanted
        .iter()
        .filter(|id| !present.contains(id))
        .map(|id| FileRestore {
            path: id.to_string(),
            result: Err(CrosbyError::BlobNotFound(id.to_string())),
        })
        .collect()
}

async fn restore_one(
    client: &CacheClient,
    root: &Path,
    result_id: &Uuid,
    info: &BlobInfo,
) -> FileRestore {
    let Some(relative) = info.relative_path(result_id) else {
        return FileRestore {
            path: info.name.clone(),
            result: Err(CrosbyError::Restore {
                path: info.name.clone(),
                reason: "blob does not belong to this result".to_string(),
            }),
        };
    };

    let result = match resolve_output_path(root, relative) {
        Some(target) => write_blob(client, &info.id, &target)
            .await
            .map_err(|e| CrosbyError::Restore {
                path: relative.to_string(),
                reason: e.to_string(),
            }),
        None => Err(CrosbyError::Restore {
            path: relative.to_string(),
            reason: "path escapes the project directory".to_string(),
        }),
    };

    FileRestore {
        path: relative.to_string(),
        result,
    }
}

/// Create parent directories, stream the blob into place, close the file
/// and mark it executable.
async fn write_blob(client: &CacheClient, id: &BlobId, target: &Path) -> CrosbyResult<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| CrosbyError::io(format!("creating {}", parent.display()), e))?;
    }

    let mut reader = client.blobs.get(id).await?;
    let mut file = fs::File::create(target)
        .await
        .map_err(|e| CrosbyError::io(format!("creating {}", target.display()), e))?;
    tokio::io::copy(&mut reader, &mut file)
        .await
        .map_err(|e| CrosbyError::io(format!("writing {}", target.display()), e))?;
    file.flush()
        .await
        .map_err(|e| CrosbyError::io(format!("closing {}", target.display()), e))?;
    drop(file);

    make_executable(target).await?;
    debug!("Restored {}", target.display());
    Ok(())
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> CrosbyResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path)
        .await
        .map_err(|e| CrosbyError::io(format!("reading permissions of {}", path.display()), e))?;
    let mode = metadata.permissions().mode() | 0o111;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| CrosbyError::io(format!("making {} executable", path.display()), e))
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> CrosbyResult<()> {
    Ok(())
}
