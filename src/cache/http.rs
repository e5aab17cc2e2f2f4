//! Remote cache server over HTTP
//!
//! Endpoints (relative to the configured base URL):
//!
//! - `POST /sources/find` with a JSON fingerprint, replies with a JSON array
//!   of result sets
//! - `POST /sources` with a JSON result set
//! - `POST /blobs?name=<name>` with raw bytes, replies `{"id": "..."}`
//! - `GET /blobs/<id>` replies with raw bytes
//! - `POST /blobs/find` with a JSON array of ids, replies with `[{"id", "name"}]`
//!
//! `ureq` is blocking, so every request runs on the blocking thread pool.
//! Blob bodies are streamed in both directions and never held in memory
//! whole.

use crate::cache::blob::{BlobId, BlobInfo, BlobReader, BlobStore};
use crate::cache::index::{CacheIndex, ResultSet};
use crate::error::{CrosbyError, CrosbyResult};
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io::{Cursor, Read};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::debug;

/// Size of one downloaded chunk
const CHUNK_SIZE: usize = 64 * 1024;
/// Chunks buffered between the download thread and the reader
const CHUNKS_IN_FLIGHT: usize = 8;

/// HTTP client for a remote cache server
#[derive(Clone)]
pub struct HttpStore {
    agent: ureq::Agent,
    base_url: String,
}

#[derive(Deserialize)]
struct PutReply {
    id: BlobId,
}

impl HttpStore {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Run a blocking request off the async runtime
    async fn blocking<T, F>(&self, request: F) -> CrosbyResult<T>
    where
        T: Send + 'static,
        F: FnOnce(ureq::Agent) -> CrosbyResult<T> + Send + 'static,
    {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || request(agent))
            .await
            .map_err(|e| CrosbyError::Internal(format!("http worker failed: {}", e)))?
    }
}

/// Classify a ureq failure: rejected requests are protocol errors,
/// everything else means the server could not be reached.
fn transport(e: ureq::Error) -> CrosbyError {
    match e {
        ureq::Error::StatusCode(code) if (400..500).contains(&code) => {
            CrosbyError::BackendProtocol(format!("server rejected request with status {}", code))
        }
        other => CrosbyError::connectivity(other),
    }
}

fn read_json<T: DeserializeOwned>(
    mut response: ureq::http::Response<ureq::Body>,
) -> CrosbyResult<T> {
    let body = response.body_mut().read_to_string().map_err(transport)?;
    serde_json::from_str(&body).map_err(|e| CrosbyError::BackendProtocol(e.to_string()))
}

#[async_trait]
impl CacheIndex for HttpStore {
    async fn find(&self, query: &Fingerprint) -> CrosbyResult<Vec<ResultSet>> {
        let url = self.url("/sources/find");
        let body = serde_json::to_vec(query)?;
        debug!("POST {}", url);

        self.blocking(move |agent| {
            let response = agent
                .post(&url)
                .header("content-type", "application/json")
                .send(&body[..])
                .map_err(transport)?;
            read_json(response)
        })
        .await
    }

    async fn insert(&self, result: &ResultSet) -> CrosbyResult<()> {
        let url = self.url("/sources");
        let body = serde_json::to_vec(result)?;
        debug!("POST {}", url);

        self.blocking(move |agent| {
            agent
                .post(&url)
                .header("content-type", "application/json")
                .send(&body[..])
                .map_err(transport)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl BlobStore for HttpStore {
    async fn put(&self, name: &str, reader: BlobReader) -> CrosbyResult<BlobId> {
        let url = self.url("/blobs");
        let name = name.to_string();
        debug!("POST {} ({})", url, name);

        // Must be built on the runtime, before moving to the blocking pool
        let body = SyncIoBridge::new(reader);
        self.blocking(move |agent| {
            let response = agent
                .post(&url)
                .query("name", &name)
                .header("content-type", "application/octet-stream")
                .send(ureq::SendBody::from_owned_reader(body))
                .map_err(transport)?;
            let reply: PutReply = read_json(response)?;
            Ok(reply.id)
        })
        .await
    }

    async fn get(&self, id: &BlobId) -> CrosbyResult<BlobReader> {
        let url = self.url(&format!("/blobs/{}", id));
        let missing = id.to_string();
        debug!("GET {}", url);

        let body = self
            .blocking(move |agent| {
                let response = agent.get(&url).call().map_err(|e| match e {
                    ureq::Error::StatusCode(404) => CrosbyError::BlobNotFound(missing),
                    other => transport(other),
                })?;
                Ok(response.into_body().into_reader())
            })
            .await?;

        Ok(Box::new(stream_body(body)))
    }

    async fn get_many(&self, ids: &[BlobId]) -> CrosbyResult<Vec<BlobInfo>> {
        let url = self.url("/blobs/find");
        let body = serde_json::to_vec(ids)?;

        self.blocking(move |agent| {
            let response = agent
                .post(&url)
                .header("content-type", "application/json")
                .send(&body[..])
                .map_err(transport)?;
            read_json(response)
        })
        .await
    }
}

/// Pump a blocking body into an async reader chunk by chunk.
///
/// Read errors reach the consumer; dropping the reader stops the download.
fn stream_body(mut body: impl Read + Send + 'static) -> impl tokio::io::AsyncRead + Send + Unpin {
    let (tx, rx) = mpsc::channel::<std::io::Result<Cursor<Vec<u8>>>>(CHUNKS_IN_FLIGHT);

    tokio::task::spawn_blocking(move || {
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            let item = match body.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => Ok(Cursor::new(chunk[..n].to_vec())),
                Err(e) => Err(e),
            };
            let failed = item.is_err();
            if tx.blocking_send(item).is_err() || failed {
                break;
            }
        }
    });

    let chunks = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    StreamReader::new(Box::pin(chunks))
}
