//! Build queue backed by PostgreSQL.
//!
//! Messages live in `build_queue` until acknowledged. Claiming marks a row
//! with the worker id under `FOR UPDATE SKIP LOCKED`, so competing workers
//! never receive the same message. Acknowledging deletes the row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deployio_core::BuildId;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::debug;

use crate::QueueResult;

/// A claimed, not yet acknowledged message.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Delivery {
    pub id: i64,
    /// Raw message body. Not guaranteed to be valid JSON.
    pub payload: String,
    pub enqueued_at: DateTime<Utc>,
}

/// The message body for a build request.
pub fn build_message(build_id: BuildId) -> String {
    serde_json::json!({ "build_id": build_id.get() }).to_string()
}

#[async_trait]
pub trait BuildQueue: Send + Sync {
    /// Append a raw message. Returns the message id.
    async fn enqueue(&self, payload: &str) -> QueueResult<i64>;

    /// Claim the oldest unclaimed message, if any.
    async fn claim(&self, worker_id: &str) -> QueueResult<Option<Delivery>>;

    /// Remove a claimed message for good.
    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    async fn enqueue_build(&self, build_id: BuildId) -> QueueResult<i64> {
        self.enqueue(&build_message(build_id)).await
    }
}

pub struct PgBuildQueue {
    pool: PgPool,
}

impl PgBuildQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BuildQueue for PgBuildQueue {
    async fn enqueue(&self, payload: &str) -> QueueResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO build_queue (payload, enqueued_at) VALUES ($1, NOW()) RETURNING id",
        )
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;
        debug!(message_id = id, "Enqueued message");
        Ok(id)
    }

    async fn claim(&self, worker_id: &str) -> QueueResult<Option<Delivery>> {
        let delivery = sqlx::query_as::<_, Delivery>(
            r#"
            UPDATE build_queue
            SET claimed_by = $1, claimed_at = NOW()
            WHERE id = (
                SELECT id FROM build_queue
                WHERE claimed_by IS NULL
                ORDER BY id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, payload, enqueued_at
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(delivery)
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        sqlx::query("DELETE FROM build_queue WHERE id = $1")
            .bind(delivery.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
