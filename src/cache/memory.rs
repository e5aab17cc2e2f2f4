//! In-process backend
//!
//! Holds result sets and blobs in memory. Used by the test suites; fault
//! injection switches let them simulate an unreachable or flaky cache.

use crate::cache::blob::{BlobId, BlobInfo, BlobReader, BlobStore};
use crate::cache::index::{CacheIndex, ResultSet};
use crate::error::{CrosbyError, CrosbyResult};
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Memory-backed index and blob store
#[derive(Default)]
pub struct MemoryStore {
    results: Mutex<Vec<ResultSet>>,
    blobs: Mutex<HashMap<BlobId, (String, Vec<u8>)>>,
    offline: AtomicBool,
    reject_inserts: AtomicBool,
    failing_puts: AtomicU32,
    put_calls: AtomicU32,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a connectivity error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make `insert` fail
    pub fn set_reject_inserts(&self, reject: bool) {
        self.reject_inserts.store(reject, Ordering::SeqCst);
    }

    /// Fail the next `count` puts with a transient error
    pub fn fail_next_puts(&self, count: u32) {
        self.failing_puts.store(count, Ordering::SeqCst);
    }

    /// Number of `put` calls seen, including failed ones
    pub fn put_calls(&self) -> u32 {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Copy of every stored result set
    pub async fn result_sets(&self) -> Vec<ResultSet> {
        self.results.lock().await.clone()
    }

    /// Content of a stored blob
    pub async fn blob_bytes(&self, id: &BlobId) -> Option<Vec<u8>> {
        self.blobs.lock().await.get(id).map(|(_, bytes)| bytes.clone())
    }

    /// Number of stored blobs
    pub async fn blob_count(&self) -> usize {
        self.blobs.lock().await.len()
    }

    fn check_online(&self) -> CrosbyResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CrosbyError::connectivity("memory store is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheIndex for MemoryStore {
    async fn find(&self, query: &Fingerprint) -> CrosbyResult<Vec<ResultSet>> {
        self.check_online()?;
        let results = self.results.lock().await;
        Ok(results
            .iter()
            .filter(|r| r.fingerprint.covers(query))
            .cloned()
            .collect())
    }

    async fn insert(&self, result: &ResultSet) -> CrosbyResult<()> {
        self.check_online()?;
        if self.reject_inserts.load(Ordering::SeqCst) {
            return Err(CrosbyError::connectivity("insert rejected"));
        }
        self.results.lock().await.push(result.clone());
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn put(&self, name: &str, mut reader: BlobReader) -> CrosbyResult<BlobId> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| CrosbyError::io(format!("reading {}", name), e))?;

        let should_fail = self
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(CrosbyError::connectivity("transient upload failure"));
        }

        let id = BlobId::from(Uuid::new_v4().to_string());
        self.blobs
            .lock()
            .await
            .insert(id.clone(), (name.to_string(), bytes));
        Ok(id)
    }

    async fn get(&self, id: &BlobId) -> CrosbyResult<BlobReader> {
        self.check_online()?;
        let blobs = self.blobs.lock().await;
        let (_, bytes) = blobs
            .get(id)
            .ok_or_else(|| CrosbyError::BlobNotFound(id.to_string()))?;
        Ok(Box::new(Cursor::new(bytes.clone())))
    }

    async fn get_many(&self, ids: &[BlobId]) -> CrosbyResult<Vec<BlobInfo>> {
        self.check_online()?;
        let blobs = self.blobs.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                blobs.get(id).map(|(name, _)| BlobInfo {
                    id: id.clone(),
                    name: name.clone(),
                })
            })
            .collect())
    }
}
