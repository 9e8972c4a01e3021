//! Deployment records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BuildId, ProjectId};

/// Marks one build's artifacts as live for a project. At most one row per
/// project is active; activating a build inserts a new row and deactivates the
/// rest, so history is never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: i64,
    pub project_id: ProjectId,
    pub build_id: BuildId,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}
