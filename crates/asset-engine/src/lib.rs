//! # Asset Engine
//!
//! Resolves versioned frontend assets — a file of a named project, addressed
//! by a source-control revision or a release version — into byte content by
//! walking ordered chains of content providers, with transparent write-back
//! caching on every successful lookup.
//!
//! ## Design
//!
//! - Provider chains answer with a three-valued [`pipeline::Outcome`]:
//!   found, definitively absent, or "ask the next tier".
//! - Every consulted provider is notified of the search result in reverse
//!   order, so fast tiers backfill themselves from slow ones.
//! - Durable cache entries are write-once; racing writers are resolved by
//!   the store's conditional create, with no in-process locking.
//!
//! The HTTP serving layer, health checks, and the concrete object-storage
//! transport live outside this crate; [`AssetService`] is the boundary.

pub mod artifact;
pub mod config;
pub mod pipeline;
pub mod remote;
pub mod service;
pub mod validate;
pub mod version;

pub use artifact::ArtifactRequest;
pub use config::{EngineConfig, Project};
pub use pipeline::{Outcome, Pipeline, Provider};
pub use remote::{HttpRemote, RemoteError, RemoteFetch, RemoteResponse};
pub use service::AssetService;
pub use version::VersionResolver;
