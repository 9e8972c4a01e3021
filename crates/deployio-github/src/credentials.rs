//! Credential resolution with silent token renewal.

use chrono::Utc;
use deployio_core::{Error, Result, UserId};
use deployio_db::CredentialRepo;
use std::sync::Arc;
use tracing::{info, warn};

use crate::oauth::{OAuthGrant, TokenExchange};

/// Hands out a usable access token for a user, refreshing the stored pair
/// when only the access token has expired.
///
/// There is no lock around a refresh: two workers refreshing the same user
/// race and the last write wins.
pub struct CredentialResolver {
    credentials: Arc<dyn CredentialRepo>,
    exchange: Arc<dyn TokenExchange>,
}

impl CredentialResolver {
    pub fn new(credentials: Arc<dyn CredentialRepo>, exchange: Arc<dyn TokenExchange>) -> Self {
        Self {
            credentials,
            exchange,
        }
    }

    pub async fn get_access_token(&self, user_id: UserId) -> Result<String> {
        let credential = self.credentials.get_credential(user_id).await?;
        let now = Utc::now();

        if !credential.refresh_valid_at(now) {
            warn!(user_id = %user_id, "Refresh token expired");
            return Err(Error::CredentialExpired(user_id));
        }

        if credential.access_valid_at(now) {
            return Ok(credential.tokens.access_token);
        }

        info!(user_id = %user_id, "Access token expired, refreshing");
        let response = self
            .exchange
            .exchange(&OAuthGrant::RefreshToken(credential.tokens.refresh_token))
            .await
            .map_err(|e| Error::Credential(format!("token refresh failed: {}", e)))?;

        let tokens = response
            .into_token_pair(Utc::now())
            .map_err(|e| Error::Credential(format!("token refresh failed: {}", e)))?;
        self.credentials.update_tokens(user_id, &tokens).await?;

        Ok(tokens.access_token)
    }
}
