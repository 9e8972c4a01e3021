//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for deployio_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => deployio_core::Error::NotFound(what),
            other => deployio_core::Error::Persistence(other.to_string()),
        }
    }
}
