//! OAuth token exchange against the provider's token endpoint.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use deployio_core::credential::TokenPair;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::{GitHubError, GitHubResult};

/// The two request shapes the token endpoint accepts.
#[derive(Debug, Clone)]
pub enum OAuthGrant {
    /// First sign-in: exchange the callback code.
    AuthorizationCode(String),
    /// Silent renewal with a stored refresh token.
    RefreshToken(String),
}

/// Successful token endpoint response. Expiries are in seconds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub refresh_token_expires_in: i64,
    #[serde(default)]
    pub token_type: String,
}

fn expiry_after(now: DateTime<Utc>, field: &str, seconds: i64) -> GitHubResult<DateTime<Utc>> {
    if seconds <= 0 {
        return Err(GitHubError::Parse(format!("{field} must be positive, got {seconds}")));
    }
    TimeDelta::try_seconds(seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| GitHubError::Parse(format!("{field} out of range: {seconds}")))
}

impl TokenResponse {
    /// Turn relative expiries into absolute ones as of `now`.
    pub fn into_token_pair(self, now: DateTime<Utc>) -> GitHubResult<TokenPair> {
        Ok(TokenPair {
            access_expires_at: expiry_after(now, "expires_in", self.expires_in)?,
            refresh_expires_at: expiry_after(
                now,
                "refresh_token_expires_in",
                self.refresh_token_expires_in,
            )?,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
        })
    }

    /// A usable pair carries both tokens and expiries that fit a timestamp.
    fn validate(&self, now: DateTime<Utc>) -> GitHubResult<()> {
        if self.refresh_token.is_empty() {
            return Err(GitHubError::Parse(
                "token response carried no refresh token".to_string(),
            ));
        }
        expiry_after(now, "expires_in", self.expires_in)?;
        expiry_after(now, "refresh_token_expires_in", self.refresh_token_expires_in)?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Read a token endpoint body: a token payload if it carries an access token,
/// otherwise a provider error payload, otherwise a parse failure.
pub fn parse_token_response(body: &[u8]) -> GitHubResult<TokenResponse> {
    let token: TokenResponse =
        serde_json::from_slice(body).map_err(|e| GitHubError::Parse(e.to_string()))?;
    if !token.access_token.is_empty() {
        token.validate(Utc::now())?;
        return Ok(token);
    }

    let provider: ProviderErrorBody =
        serde_json::from_slice(body).map_err(|e| GitHubError::Parse(e.to_string()))?;
    if !provider.error.is_empty() {
        let description = if provider.error_description.is_empty() {
            provider.error.clone()
        } else {
            provider.error_description
        };
        return Err(GitHubError::Provider {
            code: provider.error,
            description,
        });
    }

    Err(GitHubError::Parse(
        "token response carried neither a token nor an error".to_string(),
    ))
}

/// Trait for exchanging a grant for a fresh token pair.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, grant: &OAuthGrant) -> GitHubResult<TokenResponse>;
}

/// GitHub OAuth application client.
pub struct GitHubOAuthClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    token_url: Url,
}

impl GitHubOAuthClient {
    pub fn new(client_id: String, client_secret: String, token_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
            client_secret,
            token_url,
        }
    }

    /// Exchange an OAuth callback code for a token pair.
    pub async fn exchange_code(&self, code: &str) -> GitHubResult<TokenResponse> {
        self.exchange(&OAuthGrant::AuthorizationCode(code.to_string()))
            .await
    }

    fn params<'a>(&'a self, grant: &'a OAuthGrant) -> Vec<(&'static str, &'a str)> {
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        match grant {
            OAuthGrant::AuthorizationCode(code) => params.push(("code", code.as_str())),
            OAuthGrant::RefreshToken(token) => {
                params.push(("refresh_token", token.as_str()));
                params.push(("grant_type", "refresh_token"));
            }
        }
        params
    }
}

#[async_trait]
impl TokenExchange for GitHubOAuthClient {
    async fn exchange(&self, grant: &OAuthGrant) -> GitHubResult<TokenResponse> {
        let kind = match grant {
            OAuthGrant::AuthorizationCode(_) => "authorization_code",
            OAuthGrant::RefreshToken(_) => "refresh_token",
        };
        debug!(grant = kind, "Calling OAuth token endpoint");

        let response = self
            .client
            .post(self.token_url.clone())
            .header("Accept", "application/json")
            .header("User-Agent", crate::USER_AGENT)
            .form(&self.params(grant))
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(GitHubError::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).to_string(),
            });
        }

        parse_token_response(&body)
    }
}
