//! GitHub API errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Structured error payload returned by the OAuth endpoint.
    #[error("{description}")]
    Provider { code: String, description: String },

    #[error("parse error: {0}")]
    Parse(String),
}

pub type GitHubResult<T> = std::result::Result<T, GitHubError>;

impl From<reqwest::Error> for GitHubError {
    fn from(err: reqwest::Error) -> Self {
        GitHubError::Request(err.to_string())
    }
}

impl From<GitHubError> for deployio_core::Error {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::Provider { .. } => deployio_core::Error::Credential(err.to_string()),
            other => deployio_core::Error::Transient(other.to_string()),
        }
    }
}
