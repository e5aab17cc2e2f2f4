//! Content-addressed output cache
//!
//! A fingerprint of the project inputs keys a [`ResultSet`] in the
//! [`CacheIndex`]; the result set lists the [`BlobStore`] ids of the files
//! the command produced. Result sets are immutable once inserted.
//!
//! # Backends
//!
//! | Backend | Index | Blobs |
//! |---------|-------|-------|
//! | local | `index.jsonl` in a directory | files under `blobs/` |
//! | http | `POST /sources[/find]` | `/blobs` endpoints |
//! | memory | in-process (tests) | in-process (tests) |

pub mod blob;
pub mod client;
pub mod http;
pub mod index;
pub mod local;
pub mod memory;

pub use blob::{blob_name, resolve_output_path, BlobId, BlobInfo, BlobReader, BlobStore};
pub use client::CacheClient;
pub use http::HttpStore;
pub use index::{lookup, CacheIndex, Lookup, ResultSet};
pub use local::LocalStore;
pub use memory::MemoryStore;
