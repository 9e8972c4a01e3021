//! Repository metadata lookup.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::{GitHubError, GitHubResult};

/// Archive format selected for source downloads.
pub const ARCHIVE_FORMAT: &str = "tarball";

/// The fields of a repository we care about.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryMetadata {
    pub id: i64,
    #[serde(default)]
    pub full_name: String,
    /// URL template such as `https://api.github.com/repos/o/r/{archive_format}{/ref}`.
    pub archive_url: String,
    #[serde(default)]
    pub commits_url: String,
    #[serde(default)]
    pub default_branch: String,
}

impl RepositoryMetadata {
    /// Concrete tarball URL for the default branch.
    pub fn tarball_url(&self) -> String {
        archive_url_from_template(&self.archive_url)
    }
}

/// Fill the archive-format placeholder and drop the optional ref placeholder.
pub fn archive_url_from_template(template: &str) -> String {
    template
        .replace("{archive_format}", ARCHIVE_FORMAT)
        .replace("{/ref}", "")
}

/// Trait for reading repository metadata with a user's access token.
#[async_trait]
pub trait RepositoryApi: Send + Sync {
    async fn get_repository(
        &self,
        repository_id: i64,
        access_token: &str,
    ) -> GitHubResult<RepositoryMetadata>;
}

/// GitHub REST client for repository lookups by numeric id.
pub struct GitHubRepositoryClient {
    client: reqwest::Client,
    api_url: Url,
}

impl GitHubRepositoryClient {
    /// `api_url` may carry a path prefix (GitHub Enterprise serves the API
    /// under `/api/v3`).
    pub fn new(mut api_url: Url) -> Self {
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    fn repository_url(&self, repository_id: i64) -> GitHubResult<Url> {
        self.api_url
            .join(&format!("repositories/{}", repository_id))
            .map_err(|e| GitHubError::Parse(e.to_string()))
    }
}

#[async_trait]
impl RepositoryApi for GitHubRepositoryClient {
    async fn get_repository(
        &self,
        repository_id: i64,
        access_token: &str,
    ) -> GitHubResult<RepositoryMetadata> {
        let response = self
            .client
            .get(self.repository_url(repository_id)?)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("User-Agent", crate::USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GitHubError::Api { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| GitHubError::Parse(e.to_string()))
    }
}
