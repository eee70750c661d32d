//! Engine configuration.
//!
//! Defaults carry the production constants; `from_env` overlays the
//! deployment-specific cache bucket. The configuration is immutable once the
//! service is constructed.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable naming the write-back cache bucket.
pub const CACHE_BUCKET_ENV: &str = "CACHE_BUCKET";

/// Projects whose artifacts can be served. The identifier doubles as the
/// storage suffix separating the projects inside the cache bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Project {
    Frontend,
    Internal,
}

impl Project {
    pub fn id(&self) -> &'static str {
        match self {
            Project::Frontend => "devtools-frontend",
            Project::Internal => "devtools-internal",
        }
    }

    /// Cache-key suffix for this project's extracted files.
    ///
    /// The initial deployment only served frontend files and stored them
    /// without a suffix; that layout is kept for compatibility.
    pub fn storage_suffix(&self) -> Option<&'static str> {
        match self {
            Project::Frontend => None,
            Project::Internal => Some("devtools-internal"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Write-back cache bucket (extracted files, version mappings, TOCs).
    pub cache_bucket: String,

    /// Bucket holding per-release build archives.
    pub release_bucket: String,

    /// Archive blob path template; `{version}` is replaced per candidate
    /// patch version.
    pub release_artifact_template: String,

    /// Base directories probed inside release archives, per project.
    pub frontend_base_dirs: Vec<String>,
    pub internal_base_dirs: Vec<String>,

    /// Bucket holding pre-cutoff archives, pointers, manifests and the
    /// hash-addressed object space.
    pub legacy_bucket: String,

    /// Highest major version still served from the legacy bucket.
    pub last_legacy_major: u32,

    /// Commit-index service endpoint; the revision is appended.
    pub commit_index_url: String,

    /// Source-repository VERSION file URL; `{revision}` is replaced.
    pub repository_version_url: String,

    /// Request timeout for the source-repository lookup.
    pub repository_timeout: Duration,

    /// Cache age advertised by the serving layer. Documented here; not
    /// enforced inside the engine.
    pub max_cache_age: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_bucket: String::new(),
            release_bucket: "chrome-unsigned".to_string(),
            release_artifact_template: "desktop-5c0tCh/{version}/linux64/devtools-frontend.zip"
                .to_string(),
            frontend_base_dirs: vec![
                "devtools-frontend/gen/third_party/devtools-frontend-internal/devtools-frontend/front_end/"
                    .to_string(),
            ],
            internal_base_dirs: vec![
                "devtools-frontend/gen/third_party/devtools-frontend-internal/".to_string(),
            ],
            legacy_bucket: "chrome-devtools-frontend".to_string(),
            last_legacy_major: 99,
            commit_index_url: "https://chromiumdash.appspot.com/fetch_commit?commit=".to_string(),
            repository_version_url:
                "https://chromium.googlesource.com/chromium/src/+/{revision}/chrome/VERSION?format=TEXT"
                    .to_string(),
            repository_timeout: Duration::from_secs(10),
            max_cache_age: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl EngineConfig {
    /// Defaults with the cache bucket taken from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(bucket) = std::env::var(CACHE_BUCKET_ENV) {
            config.cache_bucket = bucket;
        }
        config
    }

    pub(crate) fn base_dirs(&self, project: Project) -> &[String] {
        match project {
            Project::Frontend => &self.frontend_base_dirs,
            Project::Internal => &self.internal_base_dirs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_production_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.last_legacy_major, 99);
        assert!(config.release_artifact_template.contains("{version}"));
        assert_eq!(config.max_cache_age, Duration::from_secs(604_800));
    }

    #[test]
    fn frontend_stores_without_suffix() {
        assert_eq!(Project::Frontend.storage_suffix(), None);
        assert_eq!(Project::Internal.storage_suffix(), Some("devtools-internal"));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.release_bucket, config.release_bucket);
        assert_eq!(parsed.repository_timeout, config.repository_timeout);
    }
}
