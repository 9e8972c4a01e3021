//! Queue errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;

impl From<QueueError> for deployio_core::Error {
    fn from(err: QueueError) -> Self {
        deployio_core::Error::Transient(err.to_string())
    }
}
