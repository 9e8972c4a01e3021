//! Everything that happens to a job's source tree before publication.
//!
//! - [`ArchiveSourceFetcher`]: resolves and downloads the repository tarball
//!   and unpacks it into the job's working directory
//! - [`NvmRuntimeSelector`]: activates a runtime version through the version
//!   manager and snapshots the resulting environment
//! - [`EncryptedEnvMaterializer`]: decrypts project environment variables
//! - [`BuildExecutor`]: runs install and build under a deadline and checks
//!   the declared output directory

pub mod build;
pub mod error;
pub mod runtime;
pub mod secrets;
pub mod source;

pub use build::{BuildExecutor, Stage};
pub use error::{BuildError, BuildResult, FetchError, FetchResult};
pub use runtime::NvmRuntimeSelector;
pub use secrets::EncryptedEnvMaterializer;
pub use source::ArchiveSourceFetcher;
