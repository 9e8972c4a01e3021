//! Project repository - build settings and encrypted environment variables.

use async_trait::async_trait;
use deployio_core::job::Project;
use deployio_core::{ProjectId, UserId};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::{DbError, DbResult};

/// A project record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectRecord {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub repository_id: i64,
    pub source_directory: Option<String>,
    pub install_command: Option<String>,
    pub build_command: Option<String>,
    pub output_directory: Option<String>,
    pub runtime_version: Option<String>,
}

impl From<ProjectRecord> for Project {
    fn from(record: ProjectRecord) -> Self {
        Project {
            id: ProjectId::new(record.id),
            user_id: UserId::new(record.user_id),
            name: record.name,
            repository_id: record.repository_id,
            source_directory: record.source_directory,
            install_command: record.install_command,
            build_command: record.build_command,
            output_directory: record.output_directory,
            runtime_version: record.runtime_version,
        }
    }
}

/// A project-scoped environment variable. `value` is ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnvironmentRecord {
    pub key: String,
    pub value: String,
}

#[async_trait]
pub trait ProjectRepo: Send + Sync {
    async fn get_project(&self, id: ProjectId) -> DbResult<Project>;

    /// Encrypted environment variables of a project, ordered by key.
    async fn list_environment(&self, project_id: ProjectId) -> DbResult<Vec<EnvironmentRecord>>;
}

/// PostgreSQL implementation of ProjectRepo.
pub struct PgProjectRepo {
    pool: PgPool,
}

impl PgProjectRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectRepo for PgProjectRepo {
    async fn get_project(&self, id: ProjectId) -> DbResult<Project> {
        let record = sqlx::query_as::<_, ProjectRecord>(
            r#"
            SELECT id, user_id, name, repository_id, source_directory, install_command,
                   build_command, output_directory, runtime_version
            FROM projects
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("project {}", id)))?;
        Ok(record.into())
    }

    async fn list_environment(&self, project_id: ProjectId) -> DbResult<Vec<EnvironmentRecord>> {
        let records = sqlx::query_as::<_, EnvironmentRecord>(
            "SELECT key, value FROM environments WHERE project_id = $1 ORDER BY key",
        )
        .bind(project_id.get())
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
