//! In-memory object store, plus a call-counting decorator used by tests to
//! assert how often a backend was actually consulted.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::{CreateOutcome, ObjectStore, StoreResult};

/// A process-local object store backed by a hash map.
///
/// Suitable as a test double and for small single-process deployments; the
/// conditional-create semantics match the durable backends exactly.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<(String, String), Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently held, across all buckets.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Insert an object unconditionally. Test setup only; the trait surface
    /// deliberately has no overwriting write.
    pub fn seed(&self, bucket: &str, key: &str, content: impl Into<Bytes>) {
        self.objects
            .write()
            .insert((bucket.to_string(), key.to_string()), content.into());
    }

    /// Read an object without going through the async trait. Test helper.
    pub fn peek(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn fetch(&self, bucket: &str, key: &str) -> StoreResult<Option<Bytes>> {
        Ok(self
            .objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned())
    }

    async fn create_if_absent(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
    ) -> StoreResult<CreateOutcome> {
        let mut objects = self.objects.write();
        let entry = (bucket.to_string(), key.to_string());
        if objects.contains_key(&entry) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        objects.insert(entry, content);
        Ok(CreateOutcome::Created)
    }
}

/// Decorator counting `fetch` and `create_if_absent` calls per key.
pub struct CountingStore<S> {
    inner: Arc<S>,
    fetches: RwLock<HashMap<(String, String), usize>>,
    creates: RwLock<HashMap<(String, String), usize>>,
    total_fetches: AtomicUsize,
}

impl<S: ObjectStore> CountingStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            fetches: RwLock::new(HashMap::new()),
            creates: RwLock::new(HashMap::new()),
            total_fetches: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    /// How many times `fetch` was called for the given key.
    pub fn fetch_count(&self, bucket: &str, key: &str) -> usize {
        self.fetches
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// How many times `create_if_absent` was called for the given key.
    pub fn create_count(&self, bucket: &str, key: &str) -> usize {
        self.creates
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.total_fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for CountingStore<S> {
    async fn fetch(&self, bucket: &str, key: &str) -> StoreResult<Option<Bytes>> {
        *self
            .fetches
            .write()
            .entry((bucket.to_string(), key.to_string()))
            .or_insert(0) += 1;
        self.total_fetches.fetch_add(1, Ordering::Relaxed);
        self.inner.fetch(bucket, key).await
    }

    async fn create_if_absent(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
    ) -> StoreResult<CreateOutcome> {
        *self
            .creates
            .write()
            .entry((bucket.to_string(), key.to_string()))
            .or_insert(0) += 1;
        self.inner.create_if_absent(bucket, key, content).await
    }
}
