//! Process configuration for the deployio build worker.
//!
//! Every option is a command-line flag with an environment-variable fallback.

pub mod error;
pub mod worker;

pub use error::{ConfigError, ConfigResult};
pub use worker::{LogFormat, ObjectStoreConfig, OAuthConfig, WorkerConfig};
