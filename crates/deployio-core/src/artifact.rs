//! Artifact storage abstraction.

use async_trait::async_trait;
use std::path::Path;

use crate::Result;

/// Content type for every uploaded artifact. Mapping extensions to MIME types
/// is the static server's job.
pub const ARTIFACT_CONTENT_TYPE: &str = "application/octet-stream";

/// Trait for artifact storage backends: a single bucket whose keys are
/// namespaced by project name.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// List every key under `prefix/`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Upload a local file under `key`.
    async fn put_file(&self, key: &str, path: &Path) -> Result<()>;

    /// Delete a single key.
    async fn delete(&self, key: &str) -> Result<()>;
}
