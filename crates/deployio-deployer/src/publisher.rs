//! Artifact publication and deployment activation.

use async_recursion::async_recursion;
use deployio_core::Result;
use deployio_core::artifact::ArtifactStore;
use deployio_core::deployment::Deployment;
use deployio_core::job::JobContext;
use deployio_core::source::{WorkingDirectory, remove_dir_if_exists};
use deployio_db::DeploymentRepo;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::PublishError;

/// What a publish changed in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishSummary {
    pub deleted: usize,
    pub uploaded: usize,
}

/// Replaces a project's stored artifacts with a build's output and switches
/// the project's active deployment.
pub struct ArtifactPublisher {
    store: Arc<dyn ArtifactStore>,
    deployments: Arc<dyn DeploymentRepo>,
}

impl ArtifactPublisher {
    pub fn new(store: Arc<dyn ArtifactStore>, deployments: Arc<dyn DeploymentRepo>) -> Self {
        Self { store, deployments }
    }

    /// Replace everything under `{project_name}/` with the contents of the
    /// job's output directory, then remove the working directory.
    ///
    /// The output tree is read before anything is deleted, so a missing
    /// output directory never touches the store.
    pub async fn publish(
        &self,
        ctx: &JobContext,
        working_dir: &WorkingDirectory,
    ) -> Result<PublishSummary> {
        let output_dir = ctx.output_dir(working_dir);
        if !tokio::fs::metadata(&output_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(PublishError::MissingOutput(ctx.output_directory.clone()).into());
        }

        let mut files = Vec::new();
        collect_files(&output_dir, &output_dir, &mut files)
            .await
            .map_err(PublishError::from)?;
        files.sort();

        let stale = self.store.list(&ctx.project_name).await?;
        for key in &stale {
            self.store.delete(key).await?;
        }
        debug!(project = %ctx.project_name, deleted = stale.len(), "Cleared previous artifacts");

        for (relative, path) in &files {
            let key = format!("{}/{}", ctx.project_name, relative);
            self.store.put_file(&key, path).await?;
        }

        remove_dir_if_exists(&working_dir.root).await?;

        let summary = PublishSummary {
            deleted: stale.len(),
            uploaded: files.len(),
        };
        info!(
            build_id = %ctx.build_id,
            project = %ctx.project_name,
            deleted = summary.deleted,
            uploaded = summary.uploaded,
            "Artifacts published"
        );
        Ok(summary)
    }

    /// Make this job's build the project's only active deployment.
    pub async fn activate(&self, ctx: &JobContext) -> Result<Deployment> {
        let deployment = self
            .deployments
            .activate(ctx.project_id, ctx.build_id)
            .await?;
        info!(
            build_id = %ctx.build_id,
            project = %ctx.project_name,
            deployment_id = deployment.id,
            "Deployment activated"
        );
        Ok(deployment)
    }
}

/// Object key suffix for `file`: its path below `base`, `/`-separated.
fn relative_key(base: &Path, file: &Path) -> Option<String> {
    let parts: Vec<String> = file
        .strip_prefix(base)
        .ok()?
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Recursively collect regular files below `current`. Symlinks are followed
/// for files only.
#[async_recursion]
async fn collect_files(
    base: &Path,
    current: &Path,
    files: &mut Vec<(String, PathBuf)>,
) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(current).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let file_type = entry.file_type().await?;

        let is_file = if file_type.is_symlink() {
            tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)
        } else {
            file_type.is_file()
        };

        if file_type.is_dir() {
            collect_files(base, &path, files).await?;
        } else if is_file {
            if let Some(key) = relative_key(base, &path) {
                files.push((key, path));
            }
        }
    }

    Ok(())
}
