//! Composition root.
//!
//! [`AssetService`] owns the collaborators (object store, remote transport),
//! the shared version resolver, and the memoized pipelines. Pipelines are
//! built lazily on first use for a project and are immutable afterwards;
//! the registry is construct-once, read-only thereafter.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use blob_store::ObjectStore;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::artifact::{
    ArchiveExtractor, ArtifactRequest, LegacyHashProvider, LegacyRevisionArchiveProvider,
    LegacyShortRevisionArchiveProvider, LegacyVersionArchiveProvider, ReleaseArchiveProvider,
    StoreArtifactProvider,
};
use crate::config::{EngineConfig, Project};
use crate::pipeline::Pipeline;
use crate::remote::RemoteFetch;
use crate::version::VersionResolver;

type ArtifactPipeline = Pipeline<ArtifactRequest, Bytes>;

pub struct AssetService {
    config: Arc<EngineConfig>,
    store: Arc<dyn ObjectStore>,
    versions: Arc<VersionResolver>,
    revision_pipelines: RwLock<HashMap<Project, Arc<ArtifactPipeline>>>,
    version_pipeline: OnceLock<Arc<ArtifactPipeline>>,
}

impl AssetService {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ObjectStore>,
        remote: Arc<dyn RemoteFetch>,
    ) -> Self {
        let config = Arc::new(config);
        let versions = Arc::new(VersionResolver::new(&config, store.clone(), remote));

        Self {
            config,
            store,
            versions,
            revision_pipelines: RwLock::new(HashMap::new()),
            version_pipeline: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Content of a file at a revision, or `None` if nothing could resolve
    /// it. `filename` is the path inside the artifact, without a leading
    /// slash.
    pub async fn file_by_revision(
        &self,
        revision: &str,
        filename: &str,
        project: Project,
    ) -> Option<Bytes> {
        let request = ArtifactRequest::new(revision, filename);
        self.revision_pipeline(project).resolve(&request).await
    }

    /// Content of a file at a release version, served from the legacy
    /// version-pointer scheme.
    pub async fn file_by_version(&self, version: &str, filename: &str) -> Option<Bytes> {
        let request = ArtifactRequest::new(version, filename);
        self.version_pipeline().resolve(&request).await
    }

    /// Earliest version containing the revision.
    pub async fn version_for_revision(&self, revision: &str) -> Option<String> {
        self.versions.resolve(revision).await
    }

    fn revision_pipeline(&self, project: Project) -> Arc<ArtifactPipeline> {
        if let Some(pipeline) = self.revision_pipelines.read().get(&project) {
            return pipeline.clone();
        }

        let mut pipelines = self.revision_pipelines.write();
        pipelines
            .entry(project)
            .or_insert_with(|| Arc::new(self.build_revision_pipeline(project)))
            .clone()
    }

    fn version_pipeline(&self) -> Arc<ArtifactPipeline> {
        self.version_pipeline
            .get_or_init(|| {
                Arc::new(Pipeline::new(vec![Arc::new(
                    LegacyVersionArchiveProvider::new(
                        self.store.clone(),
                        self.config.legacy_bucket.clone(),
                        self.legacy_extractor(),
                    ),
                )]))
            })
            .clone()
    }

    fn release_extractor(&self) -> ArchiveExtractor {
        ArchiveExtractor::new(
            self.store.clone(),
            self.config.release_bucket.clone(),
            self.config.cache_bucket.clone(),
        )
    }

    fn legacy_extractor(&self) -> ArchiveExtractor {
        ArchiveExtractor::new(
            self.store.clone(),
            self.config.legacy_bucket.clone(),
            self.config.cache_bucket.clone(),
        )
    }

    /// Provider order encodes the cost/completeness trade-off: the durable
    /// cache first, then the release archives, then the legacy schemes.
    fn build_revision_pipeline(&self, project: Project) -> ArtifactPipeline {
        let cache_tier = Arc::new(StoreArtifactProvider::new(
            self.store.clone(),
            self.config.cache_bucket.clone(),
            project.storage_suffix().map(str::to_string),
        ));

        let release_tier = Arc::new(ReleaseArchiveProvider::new(
            self.versions.clone(),
            self.release_extractor(),
            self.config.release_artifact_template.clone(),
            self.config.base_dirs(project).to_vec(),
            self.config.last_legacy_major,
        ));

        match project {
            Project::Frontend => Pipeline::new(vec![
                cache_tier,
                release_tier,
                Arc::new(LegacyRevisionArchiveProvider::new(
                    self.versions.clone(),
                    self.store.clone(),
                    self.config.legacy_bucket.clone(),
                    self.legacy_extractor(),
                    self.config.last_legacy_major,
                )),
                Arc::new(LegacyShortRevisionArchiveProvider::new(
                    self.store.clone(),
                    self.config.legacy_bucket.clone(),
                    self.legacy_extractor(),
                )),
                Arc::new(LegacyHashProvider::new(
                    self.store.clone(),
                    self.config.legacy_bucket.clone(),
                )),
            ]),
            // The internal project never published to the legacy schemes.
            Project::Internal => Pipeline::new(vec![cache_tier, release_tier]),
        }
    }
}
