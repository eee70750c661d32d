//! Archive-based artifact providers.
//!
//! All of them share one extraction algorithm over a list of candidate
//! archive blobs; they differ only in where the candidate list comes from:
//! the release bucket's per-patch paths, or the legacy bucket's pointer
//! blobs keyed by revision or version.

use std::sync::Arc;

use async_trait::async_trait;
use blob_store::ObjectStore;
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactRequest, toc};
use crate::pipeline::{Outcome, Provider};
use crate::validate::{SHORT_REVISION_LEN, is_valid_revision, is_valid_version};
use crate::version::VersionResolver;

/// Expand a version into its descending patch candidates, down to patch 0.
///
/// The same build may publish the requested asset only under an earlier
/// patch number, so `9.0.12.3` probes `9.0.12.3` through `9.0.12.0`.
pub fn patch_candidates(version: &str) -> Vec<String> {
    let mut parts = version.split('.');
    let (Some(major), Some(minor), Some(build), Some(patch)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Vec::new();
    };
    let Ok(patch) = patch.parse::<u32>() else {
        return Vec::new();
    };

    (0..=patch)
        .rev()
        .map(|p| format!("{major}.{minor}.{build}.{p}"))
        .collect()
}

fn major_of(version: &str) -> Option<u32> {
    version.split('.').next()?.parse().ok()
}

/// Candidate-blob extraction shared by every archive provider.
///
/// For each candidate blob in order: a cached TOC that lacks every candidate
/// path confirms absence without downloading the archive; an absent TOC
/// triggers a full download, TOC persistence, and a search of the fresh
/// listing; an unfetchable or corrupt archive skips to the next candidate.
pub(crate) struct ArchiveExtractor {
    store: Arc<dyn ObjectStore>,
    /// Bucket the archives live in.
    archive_bucket: String,
    /// Bucket TOCs are persisted to.
    cache_bucket: String,
}

impl ArchiveExtractor {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        archive_bucket: impl Into<String>,
        cache_bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            archive_bucket: archive_bucket.into(),
            cache_bucket: cache_bucket.into(),
        }
    }

    /// Look the candidate paths up in the persisted TOC.
    ///
    /// Returns `(toc_exists, first matching path)`. A fetch error counts as
    /// a missing TOC; the archive download can still rebuild it.
    async fn toc_lookup(&self, blobname: &str, paths: &[String]) -> (bool, Option<String>) {
        let key = toc::toc_key(&self.archive_bucket, blobname);
        let blob = match self.store.fetch(&self.cache_bucket, &key).await {
            Ok(blob) => blob,
            Err(e) => {
                warn!(key, error = %e, "TOC fetch failed, treating as absent");
                None
            }
        };

        let Some(blob) = blob else {
            info!(key, "requested TOC does not exist yet");
            return (false, None);
        };

        let entries = toc::parse(&blob);
        let matched = paths.iter().find(|p| entries.contains(*p)).cloned();
        (true, matched)
    }

    /// Persist a freshly built TOC. Concurrent builders race on the create;
    /// losing is a no-op since the listing is identical.
    async fn persist_toc(&self, blobname: &str, entries: &[String]) {
        let key = toc::toc_key(&self.archive_bucket, blobname);
        let encoded = toc::encode(entries);
        match self
            .store
            .create_if_absent(&self.cache_bucket, &key, encoded.into_bytes().into())
            .await
        {
            Ok(outcome) => debug!(key, ?outcome, "TOC persisted"),
            Err(e) => warn!(key, error = %e, "TOC persistence failed"),
        }
    }

    pub(crate) async fn extract(
        &self,
        blobnames: &[String],
        candidate_paths: &[String],
    ) -> Outcome<Bytes> {
        for blobname in blobnames {
            let (toc_exists, mut matched) = self.toc_lookup(blobname, candidate_paths).await;
            if toc_exists && matched.is_none() {
                info!(
                    blobname,
                    paths = candidate_paths.join(", "),
                    "none of the requested paths found in archive TOC"
                );
                return Outcome::DoesNotExist;
            }

            let archive = match self.store.fetch(&self.archive_bucket, blobname).await {
                Ok(Some(archive)) => archive,
                Ok(None) => {
                    warn!(blobname, "archive does not exist, trying next candidate");
                    continue;
                }
                Err(e) => {
                    warn!(blobname, error = %e, "archive fetch failed, trying next candidate");
                    continue;
                }
            };

            if !toc_exists {
                let entries = match toc::list_entries(&archive) {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!(blobname, error = %e, "cannot read archive, trying next candidate");
                        continue;
                    }
                };
                self.persist_toc(blobname, &entries).await;

                matched = candidate_paths
                    .iter()
                    .find(|p| entries.iter().any(|e| e == *p))
                    .cloned();
                if matched.is_none() {
                    info!(
                        blobname,
                        bucket = self.archive_bucket,
                        "requested file not found in archive"
                    );
                    return Outcome::DoesNotExist;
                }
            }

            // A matched path from a cached TOC always exists in the archive
            // (archives are immutable), so a read failure here means the
            // archive itself is damaged.
            let Some(path) = matched else {
                continue;
            };
            match toc::read_entry(&archive, &path) {
                Ok(content) => return Outcome::Found(content),
                Err(e) => {
                    warn!(blobname, path, error = %e, "archive entry extraction failed");
                    continue;
                }
            }
        }

        Outcome::ContinueSearch
    }
}

/// Resolve a legacy pointer blob into the archive blob it names.
async fn blobs_from_pointer(
    store: &Arc<dyn ObjectStore>,
    bucket: &str,
    pointer_key: &str,
) -> Vec<String> {
    let pointer = match store.fetch(bucket, pointer_key).await {
        Ok(Some(pointer)) => pointer,
        Ok(None) => {
            warn!(pointer_key, "requested pointer blob does not exist");
            return Vec::new();
        }
        Err(e) => {
            warn!(pointer_key, error = %e, "pointer fetch failed");
            return Vec::new();
        }
    };

    let buildname = String::from_utf8_lossy(&pointer).trim().to_string();
    if buildname.is_empty() {
        warn!(pointer_key, "pointer blob is empty");
        return Vec::new();
    }

    vec![format!("zips/{buildname}.zip")]
}

/// Per-release archives, published for majors newer than the legacy cutoff.
///
/// The requested revision is first resolved to its version; the candidate
/// blob list probes every patch number of the build, newest first.
pub struct ReleaseArchiveProvider {
    versions: Arc<VersionResolver>,
    extractor: ArchiveExtractor,
    artifact_template: String,
    base_dirs: Vec<String>,
    last_legacy_major: u32,
}

impl ReleaseArchiveProvider {
    pub(crate) fn new(
        versions: Arc<VersionResolver>,
        extractor: ArchiveExtractor,
        artifact_template: impl Into<String>,
        base_dirs: Vec<String>,
        last_legacy_major: u32,
    ) -> Self {
        Self {
            versions,
            extractor,
            artifact_template: artifact_template.into(),
            base_dirs,
            last_legacy_major,
        }
    }

    fn candidate_blobs(&self, version: &str) -> Vec<String> {
        patch_candidates(version)
            .iter()
            .map(|v| self.artifact_template.replace("{version}", v))
            .collect()
    }
}

#[async_trait]
impl Provider<ArtifactRequest, Bytes> for ReleaseArchiveProvider {
    fn name(&self) -> &'static str {
        "release-archive"
    }

    async fn retrieve(&self, params: &ArtifactRequest) -> Outcome<Bytes> {
        let Some(version) = self.versions.resolve(&params.key).await else {
            info!(revision = params.key, "skip provider; no version found for revision");
            return Outcome::ContinueSearch;
        };

        let Some(major) = major_of(&version) else {
            return Outcome::ContinueSearch;
        };
        if major <= self.last_legacy_major {
            info!(major, "skip provider; major version not applicable");
            return Outcome::ContinueSearch;
        }

        let blobnames = self.candidate_blobs(&version);
        if blobnames.is_empty() {
            info!(revision = params.key, "skip provider; no archive candidates for revision");
            return Outcome::ContinueSearch;
        }

        let paths: Vec<String> = self
            .base_dirs
            .iter()
            .map(|dir| format!("{dir}{}", params.filename))
            .collect();

        self.extractor.extract(&blobnames, &paths).await
    }
}

/// Pre-cutoff archives addressed by 40-character revision via a pointer blob.
pub struct LegacyRevisionArchiveProvider {
    versions: Arc<VersionResolver>,
    store: Arc<dyn ObjectStore>,
    bucket: String,
    extractor: ArchiveExtractor,
    last_legacy_major: u32,
}

impl LegacyRevisionArchiveProvider {
    pub(crate) fn new(
        versions: Arc<VersionResolver>,
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        extractor: ArchiveExtractor,
        last_legacy_major: u32,
    ) -> Self {
        Self {
            versions,
            store,
            bucket: bucket.into(),
            extractor,
            last_legacy_major,
        }
    }
}

#[async_trait]
impl Provider<ArtifactRequest, Bytes> for LegacyRevisionArchiveProvider {
    fn name(&self) -> &'static str {
        "legacy-revision-archive"
    }

    async fn retrieve(&self, params: &ArtifactRequest) -> Outcome<Bytes> {
        let Some(version) = self.versions.resolve(&params.key).await else {
            info!(revision = params.key, "skip provider; no version found for revision");
            return Outcome::ContinueSearch;
        };

        let Some(major) = major_of(&version) else {
            return Outcome::ContinueSearch;
        };
        if major > self.last_legacy_major {
            info!(major, "skip provider; major version not applicable");
            return Outcome::ContinueSearch;
        }

        let pointer_key = format!("revs/@{}", params.key);
        let blobnames = blobs_from_pointer(&self.store, &self.bucket, &pointer_key).await;
        if blobnames.is_empty() {
            info!(revision = params.key, "skip provider; no archive found for revision");
            return Outcome::ContinueSearch;
        }

        self.extractor
            .extract(&blobnames, std::slice::from_ref(&params.filename))
            .await
    }
}

/// Pre-cutoff archives addressed by 6-character short revision.
///
/// Short revisions are ambiguous and cannot be mapped to a version, so the
/// version check is skipped entirely; everything requested this way is
/// assumed to predate the cutoff.
pub struct LegacyShortRevisionArchiveProvider {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    extractor: ArchiveExtractor,
}

impl LegacyShortRevisionArchiveProvider {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        extractor: ArchiveExtractor,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            extractor,
        }
    }
}

#[async_trait]
impl Provider<ArtifactRequest, Bytes> for LegacyShortRevisionArchiveProvider {
    fn name(&self) -> &'static str {
        "legacy-short-revision-archive"
    }

    async fn retrieve(&self, params: &ArtifactRequest) -> Outcome<Bytes> {
        if !is_valid_revision(&params.key, SHORT_REVISION_LEN) {
            info!(revision = params.key, "skip provider; revision not applicable");
            return Outcome::ContinueSearch;
        }

        let pointer_key = format!("revs/@{}", params.key);
        let blobnames = blobs_from_pointer(&self.store, &self.bucket, &pointer_key).await;
        if blobnames.is_empty() {
            info!(revision = params.key, "skip provider; no archive found for revision");
            return Outcome::ContinueSearch;
        }

        self.extractor
            .extract(&blobnames, std::slice::from_ref(&params.filename))
            .await
    }
}

/// Pre-cutoff archives addressed by version string.
///
/// Archives are published per build, not per patch, so the patch component
/// is normalized to 0 before the pointer lookup.
pub struct LegacyVersionArchiveProvider {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    extractor: ArchiveExtractor,
}

impl LegacyVersionArchiveProvider {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        extractor: ArchiveExtractor,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            extractor,
        }
    }
}

#[async_trait]
impl Provider<ArtifactRequest, Bytes> for LegacyVersionArchiveProvider {
    fn name(&self) -> &'static str {
        "legacy-version-archive"
    }

    async fn retrieve(&self, params: &ArtifactRequest) -> Outcome<Bytes> {
        if !is_valid_version(&params.key) {
            warn!(version = params.key, "skip provider; invalid version provided");
            return Outcome::ContinueSearch;
        }

        let (prefix, _patch) = params.key.rsplit_once('.').expect("validated version");
        let normalized = format!("{prefix}.0");

        let pointer_key = format!("vers/{normalized}");
        let blobnames = blobs_from_pointer(&self.store, &self.bucket, &pointer_key).await;
        if blobnames.is_empty() {
            info!(version = normalized, "skip provider; no archive found for version");
            return Outcome::ContinueSearch;
        }

        self.extractor
            .extract(&blobnames, std::slice::from_ref(&params.filename))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blob_store::{CountingStore, MemoryStore};

    use crate::artifact::toc::fixtures::zip_archive;

    const ARCHIVE_BUCKET: &str = "archive-bucket";
    const CACHE_BUCKET: &str = "cache-bucket";

    fn counting_extractor() -> (Arc<CountingStore<MemoryStore>>, ArchiveExtractor) {
        let store = Arc::new(CountingStore::new(Arc::new(MemoryStore::new())));
        let extractor = ArchiveExtractor::new(store.clone(), ARCHIVE_BUCKET, CACHE_BUCKET);
        (store, extractor)
    }

    #[test]
    fn patch_candidates_descend_to_zero() {
        assert_eq!(
            patch_candidates("9.0.12.3"),
            vec!["9.0.12.3", "9.0.12.2", "9.0.12.1", "9.0.12.0"]
        );
    }

    #[test]
    fn patch_zero_yields_single_candidate() {
        assert_eq!(patch_candidates("9.0.12.0"), vec!["9.0.12.0"]);
    }

    #[test]
    fn malformed_version_yields_no_candidates() {
        assert!(patch_candidates("9.0.12").is_empty());
        assert!(patch_candidates("9.0.12.x").is_empty());
    }

    #[tokio::test]
    async fn extraction_builds_and_persists_the_toc() {
        let (store, extractor) = counting_extractor();
        let archive = zip_archive(&[("base/app.js", b"js"), ("base/app.css", b"css")]);
        store.inner().seed(ARCHIVE_BUCKET, "blob.zip", archive);

        let outcome = extractor
            .extract(&["blob.zip".to_string()], &["base/app.js".to_string()])
            .await;
        assert_eq!(outcome, Outcome::Found(Bytes::from_static(b"js")));

        let toc = store
            .inner()
            .peek(CACHE_BUCKET, &toc::toc_key(ARCHIVE_BUCKET, "blob.zip"))
            .expect("TOC persisted");
        let parsed = toc::parse(&toc);
        assert!(parsed.contains("base/app.js"));
        assert!(parsed.contains("base/app.css"));
    }

    #[tokio::test]
    async fn cached_toc_confirms_absence_without_archive_download() {
        let (store, extractor) = counting_extractor();
        let archive = zip_archive(&[("base/app.js", b"js")]);
        store.inner().seed(ARCHIVE_BUCKET, "blob.zip", archive);

        // First miss populates the TOC (one archive fetch).
        let outcome = extractor
            .extract(&["blob.zip".to_string()], &["base/missing.js".to_string()])
            .await;
        assert_eq!(outcome, Outcome::DoesNotExist);
        assert_eq!(store.fetch_count(ARCHIVE_BUCKET, "blob.zip"), 1);

        // Second miss is answered by the TOC alone.
        let outcome = extractor
            .extract(&["blob.zip".to_string()], &["base/missing.js".to_string()])
            .await;
        assert_eq!(outcome, Outcome::DoesNotExist);
        assert_eq!(store.fetch_count(ARCHIVE_BUCKET, "blob.zip"), 1);
    }

    #[tokio::test]
    async fn unfetchable_archives_skip_to_the_next_candidate() {
        let (store, extractor) = counting_extractor();
        let archive = zip_archive(&[("app.js", b"fallback")]);
        store.inner().seed(ARCHIVE_BUCKET, "second.zip", archive);

        let outcome = extractor
            .extract(
                &["first.zip".to_string(), "second.zip".to_string()],
                &["app.js".to_string()],
            )
            .await;
        assert_eq!(outcome, Outcome::Found(Bytes::from_static(b"fallback")));
    }

    #[tokio::test]
    async fn exhausting_all_candidates_continues_the_search() {
        let (_store, extractor) = counting_extractor();
        let outcome = extractor
            .extract(
                &["gone.zip".to_string(), "also-gone.zip".to_string()],
                &["app.js".to_string()],
            )
            .await;
        assert_eq!(outcome, Outcome::ContinueSearch);
    }

    #[tokio::test]
    async fn corrupt_archive_is_skipped_like_a_missing_one() {
        let (store, extractor) = counting_extractor();
        store
            .inner()
            .seed(ARCHIVE_BUCKET, "bad.zip", Bytes::from_static(b"not a zip"));
        let good = zip_archive(&[("app.js", b"good")]);
        store.inner().seed(ARCHIVE_BUCKET, "good.zip", good);

        let outcome = extractor
            .extract(
                &["bad.zip".to_string(), "good.zip".to_string()],
                &["app.js".to_string()],
            )
            .await;
        assert_eq!(outcome, Outcome::Found(Bytes::from_static(b"good")));
    }

    #[tokio::test]
    async fn multiple_base_dirs_probe_in_order() {
        let (store, extractor) = counting_extractor();
        let archive = zip_archive(&[("internal/app.js", b"internal")]);
        store.inner().seed(ARCHIVE_BUCKET, "blob.zip", archive);

        let outcome = extractor
            .extract(
                &["blob.zip".to_string()],
                &["frontend/app.js".to_string(), "internal/app.js".to_string()],
            )
            .await;
        assert_eq!(outcome, Outcome::Found(Bytes::from_static(b"internal")));
    }

    #[tokio::test]
    async fn pointer_resolution_names_the_zips_blob() {
        let memory = Arc::new(MemoryStore::new());
        memory.seed("legacy", "revs/@abc123", "build-42\n");
        let store: Arc<dyn ObjectStore> = memory;

        let blobs = blobs_from_pointer(&store, "legacy", "revs/@abc123").await;
        assert_eq!(blobs, vec!["zips/build-42.zip"]);

        let none = blobs_from_pointer(&store, "legacy", "revs/@missing").await;
        assert!(none.is_empty());
    }
}
