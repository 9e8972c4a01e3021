//! Publication errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("object store error: {0}")]
    Store(#[from] object_store::Error),

    #[error("invalid object key '{key}': {message}")]
    InvalidKey { key: String, message: String },

    #[error("output directory '{0}' does not exist")]
    MissingOutput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PublishResult<T> = std::result::Result<T, PublishError>;

impl From<PublishError> for deployio_core::Error {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::MissingOutput(_) => deployio_core::Error::Configuration(err.to_string()),
            other => deployio_core::Error::Transient(other.to_string()),
        }
    }
}
