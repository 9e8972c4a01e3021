//! Repository traits and implementations.

pub mod build;
pub mod credential;
pub mod deployment;
pub mod project;

pub use build::{BuildRecord, BuildRepo, PgBuildRepo};
pub use credential::{CredentialRecord, CredentialRepo, PgCredentialRepo};
pub use deployment::{DeploymentRecord, DeploymentRepo, PgDeploymentRepo};
pub use project::{EnvironmentRecord, PgProjectRepo, ProjectRecord, ProjectRepo};
