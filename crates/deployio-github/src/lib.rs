//! GitHub access for the deployio build worker.
//!
//! - OAuth token exchange (authorization code and refresh token grants)
//! - Repository metadata lookup (archive URL template)
//! - Credential resolution with silent token renewal

pub mod credentials;
pub mod error;
pub mod oauth;
pub mod repository;

pub use credentials::CredentialResolver;
pub use error::{GitHubError, GitHubResult};
pub use oauth::{GitHubOAuthClient, OAuthGrant, TokenExchange, TokenResponse};
pub use repository::{GitHubRepositoryClient, RepositoryApi, RepositoryMetadata};

/// User agent sent with every API request.
pub const USER_AGENT: &str = "deployio-worker";
