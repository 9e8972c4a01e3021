//! Database layer for the deployio build worker.
//!
//! Provides repository traits and PostgreSQL implementations for builds,
//! projects, credentials and deployments, plus the per-project publish lease.

pub mod error;
pub mod lease;
pub mod repo;

pub use error::{DbError, DbResult};
pub use lease::{Lease, LeaseGuard, PgProjectLease, ProjectLease};
pub use repo::*;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str, max_connections: u32) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}
