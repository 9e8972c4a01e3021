//! Secret materialization.

use async_trait::async_trait;

use crate::{ProjectId, Result};

/// Produces a project's build-time environment variables in clear form.
///
/// Implementations own the key source; call sites only see decrypted pairs,
/// which are never written back anywhere.
#[async_trait]
pub trait SecretMaterializer: Send + Sync {
    async fn materialize(&self, project_id: ProjectId) -> Result<Vec<(String, String)>>;
}
