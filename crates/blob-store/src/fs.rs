//! Filesystem-backed object store.
//!
//! Buckets map to directories under a root, object keys map to relative file
//! paths. The conditional create relies on `O_CREAT | O_EXCL` semantics
//! (`OpenOptions::create_new`), which is atomic on local filesystems — the
//! same first-writer-wins guarantee the remote backends provide.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{CreateOutcome, ObjectStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(bucket).join(key);
        // Keys are generated internally, but a traversal component would
        // silently escape the root, so reject it outright.
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::Backend(format!(
                "invalid object key {bucket}/{key}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn fetch(&self, bucket: &str, key: &str) -> StoreResult<Option<Bytes>> {
        let path = self.object_path(bucket, key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_if_absent(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
    ) -> StoreResult<CreateOutcome> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // `create_new` is the whole locking story: the open itself fails for
        // every writer after the first.
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "object already exists, skipping write");
                return Ok(CreateOutcome::AlreadyExists);
            }
            Err(e) => return Err(e.into()),
        };

        file.write_all(&content).await?;
        file.flush().await?;
        debug!(path = %path.display(), size = content.len(), "object created");
        Ok(CreateOutcome::Created)
    }
}
