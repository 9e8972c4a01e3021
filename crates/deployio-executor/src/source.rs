//! Source archive download and extraction.

use async_trait::async_trait;
use deployio_core::source::{SourceFetcher, Workspace, WorkingDirectory};
use deployio_core::{BuildId, Result};
use deployio_github::RepositoryApi;
use flate2::read::GzDecoder;
use futures::StreamExt;
use std::collections::BTreeSet;
use std::path::{Component, Path};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::{FetchError, FetchResult};

/// Fetches repository tarballs from the VCS provider into the job's
/// working directory under the shared workspace root.
pub struct ArchiveSourceFetcher {
    client: reqwest::Client,
    repositories: Arc<dyn RepositoryApi>,
    workspace: Workspace,
}

impl ArchiveSourceFetcher {
    pub fn new(repositories: Arc<dyn RepositoryApi>, workspace: Workspace) -> Self {
        Self {
            client: reqwest::Client::new(),
            repositories,
            workspace,
        }
    }

    async fn download(&self, url: &str, access_token: &str, dest: &Path) -> FetchResult<u64> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .header("User-Agent", deployio_github::USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Download(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl SourceFetcher for ArchiveSourceFetcher {
    async fn resolve_archive_url(&self, repository_id: i64, access_token: &str) -> Result<String> {
        let metadata = self
            .repositories
            .get_repository(repository_id, access_token)
            .await?;
        if metadata.archive_url.is_empty() {
            return Err(FetchError::Download(format!(
                "repository {} has no archive URL",
                repository_id
            ))
            .into());
        }
        Ok(metadata.tarball_url())
    }

    async fn fetch_and_extract(
        &self,
        url: &str,
        access_token: &str,
        build_id: BuildId,
    ) -> Result<WorkingDirectory> {
        let archive = self.workspace.archive_path(build_id);
        let root = self.workspace.job_root(build_id);

        info!(build_id = %build_id, "Downloading source archive");
        let size = self.download(url, access_token, &archive).await?;
        debug!(build_id = %build_id, bytes = size, path = %archive.display(), "Archive downloaded");

        tokio::fs::create_dir_all(&root).await?;
        let top_level = {
            let archive = archive.clone();
            let root = root.clone();
            tokio::task::spawn_blocking(move || extract_archive(&archive, &root))
                .await
                .map_err(|e| FetchError::Archive(e.to_string()))??
        };

        tokio::fs::remove_file(&archive).await?;

        let source = root.join(&top_level);
        info!(build_id = %build_id, path = %source.display(), "Source extracted");
        Ok(WorkingDirectory { root, source })
    }
}

/// Unpack a gzipped tarball into `dest` and return the name of its single
/// top-level directory.
pub fn extract_archive(archive: &Path, dest: &Path) -> FetchResult<String> {
    let file = std::fs::File::open(archive)?;
    let mut tarball = tar::Archive::new(GzDecoder::new(file));
    let mut top_level = BTreeSet::new();

    for entry in tarball.entries()? {
        let mut entry = entry?;
        // GitHub tarballs lead with a global header carrying the commit id.
        if entry.header().entry_type().is_pax_global_extensions() {
            continue;
        }

        let path = entry.path()?.into_owned();
        if let Some(Component::Normal(first)) = path.components().next() {
            top_level.insert(first.to_string_lossy().to_string());
        }

        if !entry.unpack_in(dest)? {
            return Err(FetchError::Archive(format!(
                "entry {} escapes the extraction directory",
                path.display()
            )));
        }
    }

    let mut names = top_level.into_iter();
    match (names.next(), names.next()) {
        (Some(name), None) if dest.join(&name).is_dir() => Ok(name),
        (Some(name), None) => Err(FetchError::Archive(format!(
            "top-level entry {} is not a directory",
            name
        ))),
        (None, _) => Err(FetchError::Archive("archive is empty".to_string())),
        (Some(_), Some(_)) => Err(FetchError::Archive(
            "archive has more than one top-level entry".to_string(),
        )),
    }
}
