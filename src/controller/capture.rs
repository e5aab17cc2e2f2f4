//! Miss path: run the command and store what it produced

use crate::cache::{blob_name, BlobId, CacheClient, ResultSet};
use crate::controller::process::run_command;
use crate::error::{CrosbyError, CrosbyResult};
use crate::fingerprint::{Fingerprint, Snapshot};
use crate::retry::{with_retry, RetryPolicy};
use crate::ui::{TransferProgress, UiContext};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};
use uuid::Uuid;

/// Settings for the upload fan-out
#[derive(Debug, Clone)]
pub struct UploadPlan {
    pub retry: RetryPolicy,
    pub concurrency: usize,
}

/// Run the command, collect new or rewritten files, upload them and
/// register the result set.
pub async fn capture(
    client: &CacheClient,
    root: &Path,
    args: &[String],
    fingerprint: Fingerprint,
    before: &Snapshot,
    plan: &UploadPlan,
    ctx: &UiContext,
) -> CrosbyResult<ResultSet> {
    run_command(args, root).await?;
    info!("Command finished, collecting outputs");

    let after = snapshot(root).await?;
    let outputs = after.changed_since(before);
    debug!("{} output file(s) detected", outputs.len());

    // Blob names embed the result id, so it is minted before uploading
    let mut result = ResultSet::new(Vec::new(), fingerprint);
    result.blob_ids = upload_all(client, root, result.id, &outputs, plan, ctx).await?;

    client
        .index
        .insert(&result)
        .await
        .map_err(|e| CrosbyError::ResultInsert(e.to_string()))?;

    info!("Registered result set {}", result.id);
    Ok(result)
}

/// Walk the tree on the blocking pool
pub(crate) async fn snapshot(root: &Path) -> CrosbyResult<Snapshot> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || Snapshot::capture(&root))
        .await
        .map_err(|e| CrosbyError::Internal(format!("fingerprint worker failed: {}", e)))?
}

/// Upload every output concurrently. Ids come back in the order of
/// `outputs`; the first terminal failure abandons the remaining uploads.
async fn upload_all(
    client: &CacheClient,
    root: &Path,
    result_id: Uuid,
    outputs: &[String],
    plan: &UploadPlan,
    ctx: &UiContext,
) -> CrosbyResult<Vec<BlobId>> {
    if outputs.is_empty() {
        return Ok(vec![]);
    }

    let progress = TransferProgress::new(ctx, "Caching outputs", outputs.len() as u64);
    let permits = Arc::new(Semaphore::new(plan.concurrency.max(1)));
    let mut uploads = JoinSet::new();

    for (position, relative) in outputs.iter().enumerate() {
        let client = client.clone();
        let permits = permits.clone();
        let retry = plan.retry.clone();
        let progress = progress.clone();
        let relative = relative.clone();
        let path = root.join(&relative);

        uploads.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| CrosbyError::Internal(e.to_string()))?;

            let name = blob_name(&result_id, &relative);
            let uploaded = with_retry(&retry, &format!("Uploading {}", relative), || {
                upload_one(&client, &path, &name)
            })
            .await;

            match uploaded {
                Ok(id) => {
                    progress.file_done(&relative);
                    Ok((position, id))
                }
                Err(exhausted) => {
                    progress.file_failed(&relative, &exhausted.last.to_string());
                    Err(CrosbyError::BlobUpload {
                        path: relative,
                        attempts: exhausted.attempts,
                        reason: exhausted.last.to_string(),
                    })
                }
            }
        });
    }

    let mut ids: Vec<Option<BlobId>> = vec![None; outputs.len()];
    while let Some(joined) = uploads.join_next().await {
        let outcome =
            joined.map_err(|e| CrosbyError::Internal(format!("upload task failed: {}", e)));
        match outcome.and_then(|result| result) {
            Ok((position, id)) => ids[position] = Some(id),
            Err(e) => {
                uploads.abort_all();
                progress.finish();
                return Err(e);
            }
        }
    }
    progress.finish();

    ids.into_iter()
        .map(|id| id.ok_or_else(|| CrosbyError::Internal("upload result missing".to_string())))
        .collect()
}

/// One upload attempt; the file is reopened so a retry streams from the start
async fn upload_one(client: &CacheClient, path: &Path, name: &str) -> CrosbyResult<BlobId> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| CrosbyError::io(format!("opening {}", path.display()), e))?;
    client.blobs.put(name, Box::new(file)).await
}
