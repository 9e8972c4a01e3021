//! Per-project publish lease.
//!
//! Two workers building the same project would otherwise race on
//! delete-then-upload of its artifacts. The lease is held from artifact
//! replacement until the deployment switch commits.

use async_trait::async_trait;
use deployio_core::ProjectId;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use crate::DbResult;

/// A held lease. Dropping it without calling `release` still frees it.
#[async_trait]
pub trait Lease: Send {
    async fn release(&mut self) -> DbResult<()>;
}

pub type LeaseGuard = Box<dyn Lease>;

#[async_trait]
pub trait ProjectLease: Send + Sync {
    /// Block until the project's lease is free, then take it.
    async fn acquire(&self, project_id: ProjectId) -> DbResult<LeaseGuard>;
}

/// Lease backed by a transaction-scoped PostgreSQL advisory lock keyed by the
/// project id. Rolling back (including on drop) releases the lock.
pub struct PgProjectLease {
    pool: PgPool,
}

impl PgProjectLease {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectLease for PgProjectLease {
    async fn acquire(&self, project_id: ProjectId) -> DbResult<LeaseGuard> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(project_id.get())
            .execute(&mut *tx)
            .await?;
        debug!(project_id = %project_id, "Acquired publish lease");
        Ok(Box::new(PgLease {
            project_id,
            tx: Some(tx),
        }))
    }
}

struct PgLease {
    project_id: ProjectId,
    tx: Option<Transaction<'static, Postgres>>,
}

#[async_trait]
impl Lease for PgLease {
    async fn release(&mut self) -> DbResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            debug!(project_id = %self.project_id, "Released publish lease");
        }
        Ok(())
    }
}
