//! Build repository.
//!
//! The worker is the only writer of build rows once they are queued. Status
//! updates are guarded in SQL so a status never moves backwards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deployio_core::BuildId;
use deployio_core::ProjectId;
use deployio_core::job::{Build, BuildStatus};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::{DbError, DbResult};

/// A build record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BuildRecord {
    pub id: i64,
    pub project_id: i64,
    pub status: String,
    pub triggered_by: String,
    pub commit_hash: Option<String>,
    pub logs: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl TryFrom<BuildRecord> for Build {
    type Error = DbError;

    fn try_from(record: BuildRecord) -> DbResult<Self> {
        let status = record
            .status
            .parse::<BuildStatus>()
            .map_err(|e| DbError::InvalidData(format!("build {}: {}", record.id, e)))?;
        Ok(Build {
            id: BuildId::new(record.id),
            project_id: ProjectId::new(record.project_id),
            commit_hash: record.commit_hash,
            triggered_by: record.triggered_by,
            status,
            logs: record.logs,
            start_time: record.start_time,
            end_time: record.end_time,
        })
    }
}

#[async_trait]
pub trait BuildRepo: Send + Sync {
    async fn get_build(&self, id: BuildId) -> DbResult<Build>;

    /// Move a queued build to running and stamp its start time.
    /// Returns false when the build was not queued.
    async fn mark_running(&self, id: BuildId) -> DbResult<bool>;

    /// Append a line to the build log and stamp its end time.
    async fn append_log(&self, id: BuildId, line: &str) -> DbResult<()>;

    /// Move a queued or running build to a terminal status.
    /// Returns false when the build was already terminal.
    async fn finish(&self, id: BuildId, status: BuildStatus) -> DbResult<bool>;
}

/// PostgreSQL implementation of BuildRepo.
pub struct PgBuildRepo {
    pool: PgPool,
}

impl PgBuildRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BuildRepo for PgBuildRepo {
    async fn get_build(&self, id: BuildId) -> DbResult<Build> {
        let record = sqlx::query_as::<_, BuildRecord>(
            r#"
            SELECT id, project_id, status, triggered_by, commit_hash, logs, start_time, end_time
            FROM builds
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("build {}", id)))?;
        record.try_into()
    }

    async fn mark_running(&self, id: BuildId) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE builds SET status = 'running', start_time = NOW() WHERE id = $1 AND status = 'queued'",
        )
        .bind(id.get())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn append_log(&self, id: BuildId, line: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE builds
            SET logs = COALESCE(logs || E'\n', '') || $2, end_time = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .bind(line)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("build {}", id)));
        }
        Ok(())
    }

    async fn finish(&self, id: BuildId, status: BuildStatus) -> DbResult<bool> {
        if !status.is_terminal() {
            return Err(DbError::InvalidData(format!(
                "build {} cannot finish as {}",
                id, status
            )));
        }
        let result = sqlx::query(
            r#"
            UPDATE builds SET status = $2, end_time = NOW()
            WHERE id = $1 AND status IN ('queued', 'running')
            "#,
        )
        .bind(id.get())
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
