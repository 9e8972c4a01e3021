//! Executor errors.

use thiserror::Error;

/// Failures while resolving, downloading or unpacking a source archive.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("download failed: {0}")]
    Download(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Download(err.to_string())
    }
}

impl From<FetchError> for deployio_core::Error {
    fn from(err: FetchError) -> Self {
        deployio_core::Error::Transient(err.to_string())
    }
}

/// Failures while preparing the environment or running a build stage.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("command is empty")]
    EmptyCommand,

    #[error("command '{command}' is not allowed, commands must start with '{allowed}'")]
    DisallowedCommand { command: String, allowed: String },

    #[error("invalid runtime version '{0}'")]
    InvalidRuntimeVersion(String),

    #[error("runtime activation failed: {0}")]
    Runtime(String),

    #[error("cannot decrypt environment variable {key}: {message}")]
    Secret { key: String, message: String },

    #[error("{stage} could not start: {message}")]
    Spawn { stage: String, message: String },

    #[error("{stage} timed out after {seconds}s")]
    Timeout { stage: String, seconds: u64 },

    #[error("{stage} failed with exit code {code}:\n{output}")]
    StageFailed {
        stage: String,
        code: i32,
        output: String,
    },

    #[error("output directory '{0}' does not exist after build")]
    MissingOutput(String),
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;

impl From<BuildError> for deployio_core::Error {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Timeout { .. } => deployio_core::Error::Timeout(err.to_string()),
            BuildError::EmptyCommand
            | BuildError::DisallowedCommand { .. }
            | BuildError::InvalidRuntimeVersion(_)
            | BuildError::Secret { .. }
            | BuildError::MissingOutput(_) => deployio_core::Error::Configuration(err.to_string()),
            BuildError::Runtime(_) | BuildError::Spawn { .. } | BuildError::StageFailed { .. } => {
                deployio_core::Error::Transient(err.to_string())
            }
        }
    }
}
