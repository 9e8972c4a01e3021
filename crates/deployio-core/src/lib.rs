//! Core domain types and traits for the deployio build worker.
//!
//! This crate contains:
//! - Identifiers for builds, projects and users
//! - Build, project, credential and deployment types
//! - The per-job context threaded through every pipeline stage
//! - Seam traits for sources, runtimes, secrets and artifact storage

pub mod artifact;
pub mod credential;
pub mod deployment;
pub mod error;
pub mod id;
pub mod job;
pub mod runtime;
pub mod secret;
pub mod source;

pub use error::{Error, Result};
pub use id::{BuildId, ProjectId, UserId};
