//! Error types for deployio.
//!
//! Every stage error is folded into this taxonomy at the pipeline boundary and
//! written into the job log as text.

use thiserror::Error;

use crate::UserId;

#[derive(Debug, Error)]
pub enum Error {
    /// Disallowed command, missing output directory, bad project settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Token exchange or refresh failure.
    #[error("credential error: {0}")]
    Credential(String),

    #[error("credentials expired for user {0}, sign in again")]
    CredentialExpired(UserId),

    /// Network, archive, filesystem or object-store failure.
    #[error("{0}")]
    Transient(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// Database write failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transient(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
