//! Runtime activation through nvm.

use async_trait::async_trait;
use deployio_core::Result;
use deployio_core::runtime::RuntimeSelector;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::{BuildError, BuildResult};

// 20, v20, 18.17, v18.17.1
static VERSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v?\d+(\.\d+){0,2}$").unwrap());

/// Reject anything that is not a plain numeric version before it reaches a shell.
pub fn validate_runtime_version(version: &str) -> BuildResult<&str> {
    let version = version.trim();
    if VERSION_REGEX.is_match(version) {
        Ok(version)
    } else {
        Err(BuildError::InvalidRuntimeVersion(version.to_string()))
    }
}

/// Parse the output of `env -0` into a map. Entries without `=` are ignored.
pub fn parse_env_snapshot(snapshot: &[u8]) -> HashMap<String, String> {
    String::from_utf8_lossy(snapshot)
        .split('\0')
        .filter_map(|entry| entry.split_once('='))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Installs and activates a Node.js version with nvm, then reports the
/// environment of the activated shell.
pub struct NvmRuntimeSelector {
    nvm_dir: PathBuf,
    shell: String,
}

impl NvmRuntimeSelector {
    pub fn new(nvm_dir: impl Into<PathBuf>) -> Self {
        Self {
            nvm_dir: nvm_dir.into(),
            shell: "bash".to_string(),
        }
    }

    /// nvm is a shell function, so it needs a bash-compatible shell.
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    fn script(version: &str) -> String {
        // nvm chatter goes to stderr so stdout only carries the snapshot.
        format!(
            r#"source "$NVM_DIR/nvm.sh" && nvm install {v} 1>&2 && nvm use {v} 1>&2 && env -0"#,
            v = version
        )
    }
}

#[async_trait]
impl RuntimeSelector for NvmRuntimeSelector {
    async fn resolve_runtime_environment(&self, version: &str) -> Result<HashMap<String, String>> {
        let version = validate_runtime_version(version)?;
        info!(version = %version, "Activating runtime");

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(Self::script(version))
            .env("NVM_DIR", &self.nvm_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BuildError::Runtime(format!("failed to start {}: {}", self.shell, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            warn!(version = %version, "Runtime activation failed");
            return Err(BuildError::Runtime(stderr.trim().to_string()).into());
        }

        let env = parse_env_snapshot(&output.stdout);
        debug!(version = %version, vars = env.len(), "Captured runtime environment");
        Ok(env)
    }
}
