//! Source retrieval and job-owned working directories.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::{BuildId, Result};

/// An extracted source tree owned by exactly one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDirectory {
    /// `<work_root>/<build_id>`, removed as a whole on cleanup.
    pub root: PathBuf,
    /// The single top-level directory the archive unpacked to.
    pub source: PathBuf,
}

/// The shared temp root that holds every job's download and working tree.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root if missing. Returns true when it was created.
    pub async fn ensure(&self) -> Result<bool> {
        if tokio::fs::try_exists(&self.root).await? {
            return Ok(false);
        }
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(true)
    }

    pub fn job_root(&self, build_id: BuildId) -> PathBuf {
        self.root.join(build_id.to_string())
    }

    pub fn archive_path(&self, build_id: BuildId) -> PathBuf {
        self.root.join(format!("{build_id}.tar"))
    }

    /// Remove everything a job left behind. Missing paths are not an error.
    pub async fn cleanup(&self, build_id: BuildId) -> Result<()> {
        remove_dir_if_exists(&self.job_root(build_id)).await?;
        match tokio::fs::remove_file(self.archive_path(build_id)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Remove a directory tree, treating an already-missing tree as success.
pub async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Trait for fetching a repository snapshot into a working directory.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Resolve the download URL of the repository's source archive.
    async fn resolve_archive_url(&self, repository_id: i64, access_token: &str) -> Result<String>;

    /// Download the archive and extract it into the job's working directory.
    async fn fetch_and_extract(
        &self,
        url: &str,
        access_token: &str,
        build_id: BuildId,
    ) -> Result<WorkingDirectory>;
}
