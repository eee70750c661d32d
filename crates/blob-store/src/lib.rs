//! # Blob Store
//!
//! A minimal abstraction over flat object storage, as consumed by the asset
//! resolution engine. Two primitives are required from any backend:
//!
//! - `fetch`: read an object's bytes, or learn that it does not exist
//! - `create_if_absent`: create an object only if no object exists under the
//!   key yet — never overwrite
//!
//! The conditional create is the only concurrency-control mechanism in the
//! system: independent serving instances racing to populate the same cache
//! key all issue creates, exactly one wins, and every loser observes
//! [`CreateOutcome::AlreadyExists`] as a silent no-op. Objects are write-once
//! for their whole lifetime.

use async_trait::async_trait;
use bytes::Bytes;

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::{CountingStore, MemoryStore};

/// Result of a conditional object creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The object was created; this writer won the race.
    Created,
    /// An object already exists under the key; nothing was written.
    AlreadyExists,
}

/// Errors surfaced by a storage backend.
///
/// "Object not found" is not an error — `fetch` models it as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A flat object namespace, addressed by `(bucket, key)`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's bytes; `Ok(None)` if no object exists under the key.
    async fn fetch(&self, bucket: &str, key: &str) -> StoreResult<Option<Bytes>>;

    /// Create an object only if the key is still unoccupied.
    ///
    /// Must never overwrite: a concurrent loser gets
    /// [`CreateOutcome::AlreadyExists`], not an error.
    async fn create_if_absent(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
    ) -> StoreResult<CreateOutcome>;
}
