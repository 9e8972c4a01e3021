//! Install and build stage execution.

use deployio_core::runtime::RuntimeSelector;
use deployio_core::secret::SecretMaterializer;
use deployio_core::{ProjectId, Result};
use std::collections::HashMap;
use std::fmt;
use std::collections::HashSet;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::{BuildError, BuildResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Install,
    Build,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Install => "install",
            Stage::Build => "build",
        }
    }

    /// Progress line written to the job log before the stage starts.
    pub fn banner(&self) -> &'static str {
        match self {
            Stage::Install => "[INSTALL] Installing dependencies",
            Stage::Build => "[BUILD] Running build command",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs a project's install and build commands as plain subprocesses.
pub struct BuildExecutor {
    package_manager: String,
    stage_timeout: Duration,
    runtime: Arc<dyn RuntimeSelector>,
    secrets: Arc<dyn SecretMaterializer>,
    withheld_env: HashSet<String>,
}

impl BuildExecutor {
    pub fn new(
        package_manager: impl Into<String>,
        stage_timeout: Duration,
        runtime: Arc<dyn RuntimeSelector>,
        secrets: Arc<dyn SecretMaterializer>,
    ) -> Self {
        Self {
            package_manager: package_manager.into(),
            stage_timeout,
            runtime,
            secrets,
            withheld_env: HashSet::new(),
        }
    }

    /// Keep these worker variables out of stage environments. Project
    /// variables may still set them.
    pub fn with_withheld_env(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.withheld_env.extend(keys);
        self
    }

    /// Split a command into argv, rejecting anything not led by the
    /// sanctioned package manager.
    pub fn validate_command(&self, command: &str) -> BuildResult<Vec<String>> {
        let argv: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        match argv.first() {
            None => Err(BuildError::EmptyCommand),
            Some(program) if *program == self.package_manager => Ok(argv),
            Some(_) => Err(BuildError::DisallowedCommand {
                command: command.trim().to_string(),
                allowed: self.package_manager.clone(),
            }),
        }
    }

    /// Assemble the stage environment. Later sources win on collisions:
    /// process environment, then the activated runtime, then project variables.
    /// Withheld worker variables are dropped before project variables apply.
    pub async fn prepare_environment(
        &self,
        runtime_version: &str,
        project_id: ProjectId,
    ) -> Result<HashMap<String, String>> {
        let mut env: HashMap<String, String> = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();

        let runtime = self
            .runtime
            .resolve_runtime_environment(runtime_version)
            .await?;
        env.extend(runtime);
        env.retain(|key, _| !self.withheld_env.contains(key));

        let project = self.secrets.materialize(project_id).await?;
        debug!(project_id = %project_id, vars = project.len(), "Injecting project variables");
        env.extend(project);

        Ok(env)
    }

    /// Run one stage in `dir` and return its combined stdout and stderr.
    pub async fn run_stage(
        &self,
        stage: Stage,
        command: &str,
        dir: &Path,
        env: &HashMap<String, String>,
    ) -> Result<String> {
        let argv = self.validate_command(command)?;
        info!(stage = %stage, command = %command, dir = %dir.display(), "Running stage");

        let child = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(dir)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BuildError::Spawn {
                stage: stage.to_string(),
                message: e.to_string(),
            })?;

        let (status, combined) = match tokio::time::timeout(
            self.stage_timeout,
            wait_with_combined_output(child),
        )
        .await
        {
            Err(_) => {
                warn!(stage = %stage, "Stage deadline exceeded, process killed");
                return Err(BuildError::Timeout {
                    stage: stage.to_string(),
                    seconds: self.stage_timeout.as_secs(),
                }
                .into());
            }
            Ok(Err(e)) => {
                return Err(BuildError::Spawn {
                    stage: stage.to_string(),
                    message: e.to_string(),
                }
                .into());
            }
            Ok(Ok(finished)) => finished,
        };

        if !status.success() {
            error!(stage = %stage, status = %status, "Stage failed");
            return Err(BuildError::StageFailed {
                stage: stage.to_string(),
                code: status.code().unwrap_or(-1),
                output: combined,
            }
            .into());
        }

        info!(stage = %stage, "Stage succeeded");
        Ok(combined)
    }

    /// Check that the build produced its declared output directory.
    pub async fn verify_output(&self, path: &Path, declared: &str) -> Result<()> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            _ => Err(BuildError::MissingOutput(declared.to_string()).into()),
        }
    }
}

/// Wait for `child`, collecting stdout and stderr lines in the order they
/// arrive. Dropping the future kills the child.
async fn wait_with_combined_output(mut child: Child) -> std::io::Result<(ExitStatus, String)> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("stderr not captured"))?;

    let mut stdout = BufReader::new(stdout).split(b'\n');
    let mut stderr = BufReader::new(stderr).split(b'\n');
    let (mut stdout_open, mut stderr_open) = (true, true);
    let mut lines = Vec::new();

    while stdout_open || stderr_open {
        let line = tokio::select! {
            line = stdout.next_segment(), if stdout_open => {
                let line = line?;
                stdout_open = line.is_some();
                line
            }
            line = stderr.next_segment(), if stderr_open => {
                let line = line?;
                stderr_open = line.is_some();
                line
            }
        };
        if let Some(line) = line {
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
    }

    let status = child.wait().await?;
    Ok((status, lines.join("\n").trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedRuntime;

    #[async_trait]
    impl RuntimeSelector for FixedRuntime {
        async fn resolve_runtime_environment(
            &self,
            version: &str,
        ) -> Result<HashMap<String, String>> {
            Ok(HashMap::from([
                ("NODE_VERSION".to_string(), version.to_string()),
                ("SHARED".to_string(), "runtime".to_string()),
            ]))
        }
    }

    struct FixedSecrets;

    #[async_trait]
    impl SecretMaterializer for FixedSecrets {
        async fn materialize(&self, _project_id: ProjectId) -> Result<Vec<(String, String)>> {
            Ok(vec![
                ("API_URL".to_string(), "https://api.example.com".to_string()),
                ("SHARED".to_string(), "project".to_string()),
            ])
        }
    }

    fn executor(timeout: Duration) -> BuildExecutor {
        BuildExecutor::new("sh", timeout, Arc::new(FixedRuntime), Arc::new(FixedSecrets))
    }

    fn script(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_validate_command() {
        let npm = BuildExecutor::new(
            "npm",
            Duration::from_secs(1),
            Arc::new(FixedRuntime),
            Arc::new(FixedSecrets),
        );

        assert_eq!(
            npm.validate_command("npm  run build").unwrap(),
            vec!["npm", "run", "build"]
        );
        assert!(matches!(
            npm.validate_command("yarn build"),
            Err(BuildError::DisallowedCommand { .. })
        ));
        assert!(matches!(
            npm.validate_command("npmx install"),
            Err(BuildError::DisallowedCommand { .. })
        ));
        assert!(matches!(npm.validate_command("   "), Err(BuildError::EmptyCommand)));
    }

    #[tokio::test]
    async fn test_environment_precedence() {
        let env = executor(Duration::from_secs(1))
            .prepare_environment("18", ProjectId::new(1))
            .await
            .unwrap();

        assert_eq!(env["NODE_VERSION"], "18");
        assert_eq!(env["SHARED"], "project");
        assert_eq!(env["API_URL"], "https://api.example.com");
        assert!(env.contains_key("PATH"));
    }

    #[tokio::test]
    async fn test_stage_output_is_captured() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "build.sh", "echo \"building with $API_URL\"\necho warn >&2\n");
        let exec = executor(Duration::from_secs(10));
        let env = exec.prepare_environment("20", ProjectId::new(1)).await.unwrap();

        let output = exec
            .run_stage(Stage::Build, "sh build.sh", dir.path(), &env)
            .await
            .unwrap();

        assert!(output.contains("building with https://api.example.com"));
        assert!(output.contains("warn"));
    }

    #[tokio::test]
    async fn test_combined_output_keeps_arrival_order() {
        let dir = tempfile::tempdir().unwrap();
        script(
            dir.path(),
            "build.sh",
            "echo step-1\nsleep 0.2\necho 'warning: step-2' >&2\nsleep 0.2\necho step-3\nexit 1\n",
        );
        let exec = executor(Duration::from_secs(10));
        let env = exec.prepare_environment("20", ProjectId::new(1)).await.unwrap();

        let err = exec
            .run_stage(Stage::Build, "sh build.sh", dir.path(), &env)
            .await
            .unwrap_err();

        assert!(
            err.to_string()
                .ends_with("step-1\nwarning: step-2\nstep-3"),
            "{err}"
        );
    }

    #[tokio::test]
    async fn test_withheld_worker_variables_are_dropped() {
        let exec = BuildExecutor::new(
            "sh",
            Duration::from_secs(1),
            Arc::new(FixedRuntime),
            Arc::new(FixedSecrets),
        )
        .with_withheld_env(["PATH".to_string(), "SHARED".to_string()]);

        let env = exec
            .prepare_environment("18", ProjectId::new(1))
            .await
            .unwrap();

        assert!(!env.contains_key("PATH"));
        assert_eq!(env["SHARED"], "project");
        assert_eq!(env["NODE_VERSION"], "18");
    }

    #[tokio::test]
    async fn test_non_zero_exit_embeds_output() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "install.sh", "echo 'npm ERR! missing script'\nexit 2\n");
        let exec = executor(Duration::from_secs(10));
        let env = exec.prepare_environment("20", ProjectId::new(1)).await.unwrap();

        let err = exec
            .run_stage(Stage::Install, "sh install.sh", dir.path(), &env)
            .await
            .unwrap_err();

        assert!(!err.is_timeout());
        assert!(err.to_string().contains("exit code 2"));
        assert!(err.to_string().contains("npm ERR! missing script"));
    }

    #[tokio::test]
    async fn test_deadline_yields_timeout() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "build.sh", "sleep 10\n");
        let exec = executor(Duration::from_millis(200));
        let env = exec.prepare_environment("20", ProjectId::new(1)).await.unwrap();

        let started = std::time::Instant::now();
        let err = exec
            .run_stage(Stage::Build, "sh build.sh", dir.path(), &env)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_disallowed_command_never_runs() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(Duration::from_secs(1));

        let err = exec
            .run_stage(Stage::Build, "touch pwned", dir.path(), &HashMap::new())
            .await
            .unwrap_err();

        assert!(err.is_configuration());
        assert!(!dir.path().join("pwned").exists());
    }

    #[tokio::test]
    async fn test_missing_output_names_directory() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(Duration::from_secs(1));

        let err = exec
            .verify_output(&dir.path().join("dist"), "/dist")
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("/dist"));

        std::fs::create_dir(dir.path().join("dist")).unwrap();
        exec.verify_output(&dir.path().join("dist"), "/dist")
            .await
            .unwrap();
    }
}
