//! Cache index: fingerprint -> result set
//!
//! The index is append-only. Backends answer a coarse query (every queried
//! file present with the same digest); the authoritative exact-match check
//! happens in [`lookup`].

use crate::cache::blob::BlobId;
use crate::error::CrosbyResult;
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Outputs recorded for one fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Minted when the miss was captured
    pub id: Uuid,

    /// One blob per captured output file
    pub blob_ids: Vec<BlobId>,

    /// Inputs this result answers
    pub fingerprint: Fingerprint,
}

impl ResultSet {
    /// Create a result set with a fresh id
    pub fn new(blob_ids: Vec<BlobId>, fingerprint: Fingerprint) -> Self {
        Self {
            id: Uuid::new_v4(),
            blob_ids,
            fingerprint,
        }
    }
}

/// Outcome of querying the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// An exactly matching result set exists
    Hit(ResultSet),
    /// Nothing stored, or no candidate matched exactly
    Miss,
}

/// Document store holding result sets
#[async_trait]
pub trait CacheIndex: Send + Sync {
    /// Return every stored result set whose fingerprint covers `query`.
    ///
    /// An empty vector means "not found"; an `Err` means the backend could
    /// not be reached.
    async fn find(&self, query: &Fingerprint) -> CrosbyResult<Vec<ResultSet>>;

    /// Append a result set. Stored result sets are never mutated.
    async fn insert(&self, result: &ResultSet) -> CrosbyResult<()>;
}

/// Query the index and pick the first exact match
pub async fn lookup(index: &dyn CacheIndex, fingerprint: &Fingerprint) -> CrosbyResult<Lookup> {
    let candidates = index.find(fingerprint).await?;
    debug!("Index returned {} candidate(s)", candidates.len());

    Ok(candidates
        .into_iter()
        .find(|candidate| candidate.fingerprint.matches(fingerprint))
        .map_or(Lookup::Miss, Lookup::Hit))
}
