//! Build scheduling for the deployio worker.
//!
//! Consumes build messages from a PostgreSQL-backed queue and drives each
//! build through the pipeline. Uses SKIP LOCKED so several worker processes
//! can compete for the same queue while each runs one job at a time.

pub mod error;
pub mod pipeline;
pub mod queue;
pub mod worker;

#[cfg(test)]
mod testing;

pub use error::{QueueError, QueueResult};
pub use pipeline::{BuildPipeline, JobOutcome, PipelineDeps, parse_message};
pub use queue::{BuildQueue, Delivery, PgBuildQueue, build_message};
pub use worker::Worker;
