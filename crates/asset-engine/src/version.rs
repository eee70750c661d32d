//! Revision→version resolution chain.
//!
//! Four tiers, cheapest first: a process-lifetime memory map, the durable
//! object cache, the commit-index service, and finally the source repository
//! itself. Remote failures never abort a resolution — every transient or
//! malformed response degrades to `ContinueSearch` so the next tier gets a
//! chance; only a repository 404 is a confirmed absence.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use blob_store::ObjectStore;
use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::pipeline::{Outcome, Pipeline, Provider};
use crate::remote::{RemoteError, RemoteFetch};
use crate::validate::{REVISION_LEN, is_valid_revision, is_valid_version};

/// Timeout for the commit-index service; its failures are non-terminal, so a
/// generous bound is fine.
const COMMIT_INDEX_TIMEOUT: Duration = Duration::from_secs(30);

static VERSION_FILE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^MAJOR=(?P<major>\d+)\nMINOR=(?P<minor>\d+)\nBUILD=(?P<build>\d+)\nPATCH=(?P<patch>\d+)\n$",
    )
    .expect("VERSION file pattern")
});

pub(crate) fn version_cache_key(revision: &str) -> String {
    format!("version_by_revision/{revision}")
}

/// Process-lifetime memory cache.
///
/// Unlike the durable tiers, this one caches negative results as well: a
/// revision confirmed to have no version yet would otherwise hit the slow
/// remote services on every request for the rest of the process lifetime.
/// The entry is never expired; a revision gaining a version mid-process
/// stays invisible until restart.
pub struct MemoryVersionProvider {
    versions: RwLock<HashMap<String, Option<String>>>,
}

impl MemoryVersionProvider {
    pub fn new() -> Self {
        Self {
            versions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryVersionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider<String, String> for MemoryVersionProvider {
    fn name(&self) -> &'static str {
        "memory-version"
    }

    async fn retrieve(&self, revision: &String) -> Outcome<String> {
        match self.versions.read().get(revision) {
            None => Outcome::ContinueSearch,
            Some(None) => Outcome::DoesNotExist,
            Some(Some(version)) => Outcome::Found(version.clone()),
        }
    }

    async fn on_resolved(&self, was_winner: bool, revision: &String, version: Option<&String>) {
        if was_winner {
            return;
        }
        self.versions
            .write()
            .insert(revision.clone(), version.cloned());
    }
}

/// Durable object-cache tier at `version_by_revision/<revision>`.
pub struct StoreVersionProvider {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl StoreVersionProvider {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl Provider<String, String> for StoreVersionProvider {
    fn name(&self) -> &'static str {
        "store-version"
    }

    async fn retrieve(&self, revision: &String) -> Outcome<String> {
        let key = version_cache_key(revision);
        let blob = match self.store.fetch(&self.bucket, &key).await {
            Ok(blob) => blob,
            Err(e) => {
                warn!(key, error = %e, "version cache fetch failed");
                return Outcome::ContinueSearch;
            }
        };

        let Some(blob) = blob else {
            return Outcome::ContinueSearch;
        };

        match String::from_utf8(blob.to_vec()) {
            Ok(version) => Outcome::Found(version),
            Err(e) => {
                warn!(key, error = %e, "version cache entry is not valid UTF-8");
                Outcome::ContinueSearch
            }
        }
    }

    async fn on_resolved(&self, was_winner: bool, revision: &String, version: Option<&String>) {
        // Never persist the value this provider just supplied, and never
        // persist absence durably.
        if was_winner {
            return;
        }
        let Some(version) = version else {
            return;
        };

        let key = version_cache_key(revision);
        match self
            .store
            .create_if_absent(&self.bucket, &key, version.clone().into_bytes().into())
            .await
        {
            Ok(outcome) => debug!(key, ?outcome, "version cache write-back"),
            Err(e) => warn!(key, error = %e, "version cache write-back failed"),
        }
    }
}

/// Commit-index service tier.
///
/// Returns the earliest release containing the commit. Every failure mode —
/// transport error, error payload, missing or invalid version — is
/// non-terminal; the repository tier behind it may still know.
pub struct CommitIndexProvider {
    remote: Arc<dyn RemoteFetch>,
    endpoint: String,
}

impl CommitIndexProvider {
    pub fn new(remote: Arc<dyn RemoteFetch>, endpoint: impl Into<String>) -> Self {
        Self {
            remote,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Provider<String, String> for CommitIndexProvider {
    fn name(&self) -> &'static str {
        "commit-index"
    }

    async fn retrieve(&self, revision: &String) -> Outcome<String> {
        let url = format!("{}{}", self.endpoint, revision);
        let response = match self.remote.get(&url, COMMIT_INDEX_TIMEOUT).await {
            Ok(response) => response,
            Err(e) => {
                warn!(revision = %revision, error = %e, "commit index unreachable");
                return Outcome::ContinueSearch;
            }
        };

        let payload: serde_json::Value = match serde_json::from_slice(&response.body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(revision = %revision, error = %e, "invalid commit index response");
                return Outcome::ContinueSearch;
            }
        };

        if let Some(error) = payload.get("error").and_then(|v| v.as_str()) {
            if error == "Commit not found." {
                info!(revision = %revision, "revision is not included in a version (yet)");
            } else {
                warn!(revision = %revision, error, "unexpected commit index error");
            }
            return Outcome::ContinueSearch;
        }

        let Some(version) = payload.get("earliest").and_then(|v| v.as_str()) else {
            warn!(revision = %revision, "revision has no version in the commit index");
            return Outcome::ContinueSearch;
        };

        if !is_valid_version(version) {
            warn!(revision = %revision, version, "invalid version from commit index");
            return Outcome::ContinueSearch;
        }

        Outcome::Found(version.to_string())
    }
}

/// Source-repository tier: reads the base64-encoded VERSION file at the
/// revision.
///
/// The file reflects the most recent version push at or before the revision,
/// which may trail the requested revision by a few commits. Only releases
/// are installable, and releases always refer to the exact version-push
/// revisions, so the skew is acceptable.
pub struct RepositoryVersionProvider {
    remote: Arc<dyn RemoteFetch>,
    url_template: String,
    timeout: Duration,
}

impl RepositoryVersionProvider {
    pub fn new(
        remote: Arc<dyn RemoteFetch>,
        url_template: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            remote,
            url_template: url_template.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Provider<String, String> for RepositoryVersionProvider {
    fn name(&self) -> &'static str {
        "repository-version"
    }

    async fn retrieve(&self, revision: &String) -> Outcome<String> {
        let url = self.url_template.replace("{revision}", revision);
        let response = match self.remote.get(&url, self.timeout).await {
            Ok(response) => response,
            Err(RemoteError::Timeout) => {
                warn!(revision = %revision, timeout = ?self.timeout, "repository lookup timed out");
                return Outcome::ContinueSearch;
            }
            Err(e) => {
                warn!(revision = %revision, error = %e, "repository unreachable");
                return Outcome::ContinueSearch;
            }
        };

        // A 404 from the repository is authoritative: the revision does not
        // exist there at all.
        if response.status == 404 {
            info!(revision = %revision, "revision not found in repository");
            return Outcome::DoesNotExist;
        }

        let decoded = match BASE64.decode(response.body.trim_ascii()) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(revision = %revision, error = %e, "VERSION file is not base64 encoded");
                return Outcome::ContinueSearch;
            }
        };

        let content = match String::from_utf8(decoded) {
            Ok(content) => content,
            Err(e) => {
                warn!(revision = %revision, error = %e, "VERSION file is not valid UTF-8");
                return Outcome::ContinueSearch;
            }
        };

        let Some(captures) = VERSION_FILE_PATTERN.captures(&content) else {
            warn!(revision = %revision, content, "cannot parse VERSION file");
            return Outcome::ContinueSearch;
        };

        Outcome::Found(format!(
            "{}.{}.{}.{}",
            &captures["major"], &captures["minor"], &captures["build"], &captures["patch"]
        ))
    }
}

/// Façade over the version pipeline: validates the revision, drives the
/// chain, logs unresolvable revisions.
pub struct VersionResolver {
    pipeline: Pipeline<String, String>,
}

impl VersionResolver {
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn ObjectStore>,
        remote: Arc<dyn RemoteFetch>,
    ) -> Self {
        let pipeline: Pipeline<String, String> = Pipeline::new(vec![
            Arc::new(MemoryVersionProvider::new()),
            Arc::new(StoreVersionProvider::new(
                store,
                config.cache_bucket.clone(),
            )),
            Arc::new(CommitIndexProvider::new(
                remote.clone(),
                config.commit_index_url.clone(),
            )),
            Arc::new(RepositoryVersionProvider::new(
                remote,
                config.repository_version_url.clone(),
                config.repository_timeout,
            )),
        ]);

        Self { pipeline }
    }

    /// Build a resolver over an explicit provider chain. Test seam.
    pub fn from_pipeline(pipeline: Pipeline<String, String>) -> Self {
        Self { pipeline }
    }

    /// Earliest version containing the revision, or `None` when the revision
    /// is invalid or not (yet) part of any version.
    pub async fn resolve(&self, revision: &str) -> Option<String> {
        if !is_valid_revision(revision, REVISION_LEN) {
            info!(revision, "invalid revision format");
            return None;
        }

        let version = self.pipeline.resolve(&revision.to_string()).await;
        if version.is_none() {
            info!(revision, "no version could be determined");
        }
        version
    }
}
