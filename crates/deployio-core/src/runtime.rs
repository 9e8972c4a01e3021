//! Language runtime selection.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::Result;

/// Activates a runtime version and reports the environment it produces.
#[async_trait]
pub trait RuntimeSelector: Send + Sync {
    async fn resolve_runtime_environment(&self, version: &str)
    -> Result<HashMap<String, String>>;
}
