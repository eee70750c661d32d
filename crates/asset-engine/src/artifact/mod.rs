//! Artifact resolution chain.
//!
//! Maps a `(revision-or-version, filename)` pair to file bytes. The chain
//! starts at the durable extracted-file cache, falls through to the archive
//! providers (release bucket, then the legacy pointer schemes), and ends at
//! the legacy hash-addressed store.

mod archive;
pub(crate) mod toc;

pub use archive::{
    LegacyRevisionArchiveProvider, LegacyShortRevisionArchiveProvider,
    LegacyVersionArchiveProvider, ReleaseArchiveProvider, patch_candidates,
};
pub(crate) use archive::ArchiveExtractor;

use std::sync::Arc;

use async_trait::async_trait;
use blob_store::ObjectStore;
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::pipeline::{Outcome, Provider};

/// Parameters of one artifact lookup. `key` is a revision for the
/// revision-keyed pipelines and a version string for the version-keyed one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactRequest {
    pub key: String,
    pub filename: String,
}

impl ArtifactRequest {
    pub fn new(key: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            filename: filename.into(),
        }
    }
}

/// Durable cache of already-extracted files.
///
/// First tier of every artifact pipeline, and the write-back target for
/// everything the slower tiers find. Entries are write-once; concurrent
/// instances racing on the same key are resolved by the store's conditional
/// create.
pub struct StoreArtifactProvider {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    storage_suffix: Option<String>,
}

impl StoreArtifactProvider {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        storage_suffix: Option<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            storage_suffix,
        }
    }

    pub(crate) fn cache_key(&self, params: &ArtifactRequest) -> String {
        match &self.storage_suffix {
            None => format!("extracted/{}/{}", params.key, params.filename),
            Some(suffix) => format!("extracted/{}-{}/{}", params.key, suffix, params.filename),
        }
    }
}

#[async_trait]
impl Provider<ArtifactRequest, Bytes> for StoreArtifactProvider {
    fn name(&self) -> &'static str {
        "store-artifact"
    }

    async fn retrieve(&self, params: &ArtifactRequest) -> Outcome<Bytes> {
        let key = self.cache_key(params);
        match self.store.fetch(&self.bucket, &key).await {
            Ok(Some(content)) => Outcome::Found(content),
            Ok(None) => Outcome::ContinueSearch,
            Err(e) => {
                warn!(key, error = %e, "artifact cache fetch failed");
                Outcome::ContinueSearch
            }
        }
    }

    async fn on_resolved(&self, was_winner: bool, params: &ArtifactRequest, content: Option<&Bytes>) {
        if was_winner {
            return;
        }
        let Some(content) = content else {
            return;
        };

        let key = self.cache_key(params);
        match self
            .store
            .create_if_absent(&self.bucket, &key, content.clone())
            .await
        {
            Ok(outcome) => debug!(key, ?outcome, "artifact cache write-back"),
            Err(e) => warn!(key, error = %e, "artifact cache write-back failed"),
        }
    }
}

/// Legacy hash-addressed store, the last tier of the frontend chain.
///
/// Two-level indirection: the per-revision manifest `meta/@<revision>` maps
/// filenames to content hashes (lines of `<hash>:<filename>`), and the hash
/// keys a flat object space under `hash/`. Some revisions served this way
/// are not part of the repository at all, so no version check is done.
pub struct LegacyHashProvider {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl LegacyHashProvider {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl Provider<ArtifactRequest, Bytes> for LegacyHashProvider {
    fn name(&self) -> &'static str {
        "legacy-hash"
    }

    async fn retrieve(&self, params: &ArtifactRequest) -> Outcome<Bytes> {
        let manifest_key = format!("meta/@{}", params.key);
        let manifest = match self.store.fetch(&self.bucket, &manifest_key).await {
            Ok(Some(manifest)) => manifest,
            Ok(None) => {
                info!(manifest_key, "skip provider; manifest does not exist");
                return Outcome::ContinueSearch;
            }
            Err(e) => {
                warn!(manifest_key, error = %e, "manifest fetch failed");
                return Outcome::ContinueSearch;
            }
        };

        let manifest = String::from_utf8_lossy(&manifest);
        let file_hash = manifest
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(_, filename)| *filename == params.filename)
            .map(|(hash, _)| hash.to_string());

        let Some(file_hash) = file_hash else {
            info!(
                filename = params.filename,
                manifest_key, "skip provider; file not listed in manifest"
            );
            return Outcome::ContinueSearch;
        };

        let hash_key = format!("hash/{file_hash}");
        match self.store.fetch(&self.bucket, &hash_key).await {
            Ok(Some(content)) => Outcome::Found(content),
            Ok(None) => {
                warn!(
                    hash_key,
                    revision = params.key,
                    "skip provider; hash object does not exist"
                );
                Outcome::ContinueSearch
            }
            Err(e) => {
                warn!(hash_key, error = %e, "hash object fetch failed");
                Outcome::ContinueSearch
            }
        }
    }
}
