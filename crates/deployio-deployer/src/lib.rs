//! Artifact publication for the deployio worker.
//!
//! Provides:
//! - [`ObjectArtifactStore`]: the artifact store over any `object_store`
//!   backend (S3-compatible in production, in-memory in tests)
//! - [`ArtifactPublisher`]: replace-not-merge upload of a build's output and
//!   the active-deployment switch

pub mod error;
pub mod publisher;
pub mod store;

pub use error::{PublishError, PublishResult};
pub use publisher::{ArtifactPublisher, PublishSummary};
pub use store::ObjectArtifactStore;
