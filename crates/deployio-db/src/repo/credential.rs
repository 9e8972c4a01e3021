//! Credential repository - per-user upstream OAuth tokens.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deployio_core::UserId;
use deployio_core::credential::{Credential, TokenPair};
use sqlx::PgPool;

use crate::{DbError, DbResult};

/// The token columns of a user row.
#[derive(Clone, sqlx::FromRow)]
pub struct CredentialRecord {
    pub id: i64,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

impl From<CredentialRecord> for Credential {
    fn from(record: CredentialRecord) -> Self {
        Credential {
            user_id: UserId::new(record.id),
            tokens: TokenPair {
                access_token: record.access_token,
                access_expires_at: record.access_expires_at,
                refresh_token: record.refresh_token,
                refresh_expires_at: record.refresh_expires_at,
            },
        }
    }
}

#[async_trait]
pub trait CredentialRepo: Send + Sync {
    async fn get_credential(&self, user_id: UserId) -> DbResult<Credential>;

    /// Overwrite all four token fields in one statement.
    async fn update_tokens(&self, user_id: UserId, tokens: &TokenPair) -> DbResult<()>;
}

/// PostgreSQL implementation of CredentialRepo.
pub struct PgCredentialRepo {
    pool: PgPool,
}

impl PgCredentialRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialRepo for PgCredentialRepo {
    async fn get_credential(&self, user_id: UserId) -> DbResult<Credential> {
        let record = sqlx::query_as::<_, CredentialRecord>(
            r#"
            SELECT id, access_token, access_expires_at, refresh_token, refresh_expires_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("user {}", user_id)))?;
        Ok(record.into())
    }

    async fn update_tokens(&self, user_id: UserId, tokens: &TokenPair) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET access_token = $2, refresh_token = $3, access_expires_at = $4, refresh_expires_at = $5
            WHERE id = $1
            "#,
        )
        .bind(user_id.get())
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(tokens.access_expires_at)
        .bind(tokens.refresh_expires_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("user {}", user_id)));
        }
        Ok(())
    }
}
