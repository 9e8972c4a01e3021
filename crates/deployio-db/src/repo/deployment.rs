//! Deployment repository - the active-deployment pointer and its history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deployio_core::deployment::Deployment;
use deployio_core::{BuildId, ProjectId};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::DbResult;

/// A deployment record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeploymentRecord {
    pub id: i64,
    pub project_id: i64,
    pub build_id: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<DeploymentRecord> for Deployment {
    fn from(record: DeploymentRecord) -> Self {
        Deployment {
            id: record.id,
            project_id: ProjectId::new(record.project_id),
            build_id: BuildId::new(record.build_id),
            active: record.active,
            created_at: record.created_at,
        }
    }
}

#[async_trait]
pub trait DeploymentRepo: Send + Sync {
    /// Deactivate every deployment of the project and insert a new active one
    /// for `build_id`, atomically.
    async fn activate(&self, project_id: ProjectId, build_id: BuildId) -> DbResult<Deployment>;

    async fn active_deployment(&self, project_id: ProjectId) -> DbResult<Option<Deployment>>;

    /// Full activation history, newest first.
    async fn list_deployments(&self, project_id: ProjectId) -> DbResult<Vec<Deployment>>;
}

/// PostgreSQL implementation of DeploymentRepo.
pub struct PgDeploymentRepo {
    pool: PgPool,
}

impl PgDeploymentRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeploymentRepo for PgDeploymentRepo {
    async fn activate(&self, project_id: ProjectId, build_id: BuildId) -> DbResult<Deployment> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE deployments SET active = false WHERE project_id = $1 AND active")
            .bind(project_id.get())
            .execute(&mut *tx)
            .await?;

        let record = sqlx::query_as::<_, DeploymentRecord>(
            r#"
            INSERT INTO deployments (project_id, build_id, active, created_at)
            VALUES ($1, $2, true, NOW())
            RETURNING id, project_id, build_id, active, created_at
            "#,
        )
        .bind(project_id.get())
        .bind(build_id.get())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record.into())
    }

    async fn active_deployment(&self, project_id: ProjectId) -> DbResult<Option<Deployment>> {
        let record = sqlx::query_as::<_, DeploymentRecord>(
            r#"
            SELECT id, project_id, build_id, active, created_at
            FROM deployments
            WHERE project_id = $1 AND active
            "#,
        )
        .bind(project_id.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(record.map(Into::into))
    }

    async fn list_deployments(&self, project_id: ProjectId) -> DbResult<Vec<Deployment>> {
        let records = sqlx::query_as::<_, DeploymentRecord>(
            r#"
            SELECT id, project_id, build_id, active, created_at
            FROM deployments
            WHERE project_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(project_id.get())
        .fetch_all(&self.pool)
        .await?;
        Ok(records.into_iter().map(Into::into).collect())
    }
}
