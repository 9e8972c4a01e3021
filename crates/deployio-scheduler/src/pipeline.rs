//! The job state machine.
//!
//! One message drives one build through credential resolution, source
//! retrieval, install, build, publication and activation, strictly in that
//! order. Every stage error ends in a `failure` status with the error text in
//! the job log; only a failure to record the `running` transition is returned
//! to the caller, since the job's status can no longer be tracked.

use deployio_core::deployment::Deployment;
use deployio_core::job::{BuildDefaults, BuildStatus, JobContext};
use deployio_core::source::{SourceFetcher, WorkingDirectory, Workspace};
use deployio_core::{BuildId, Error, Result};
use deployio_db::{BuildRepo, ProjectLease, ProjectRepo};
use deployio_deployer::ArtifactPublisher;
use deployio_executor::{BuildExecutor, Stage};
use deployio_github::CredentialResolver;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
struct BuildMessage {
    build_id: i64,
}

/// Read a queue message body. The build id must be an integer.
pub fn parse_message(payload: &str) -> serde_json::Result<BuildId> {
    let message: BuildMessage = serde_json::from_str(payload)?;
    Ok(BuildId::new(message.build_id))
}

/// How a message was handled.
#[derive(Debug)]
pub enum JobOutcome {
    /// Unparseable payload; no job row was touched.
    Dropped,
    /// The build was not queued any more (already picked up or finished).
    Skipped(BuildId),
    Succeeded {
        build_id: BuildId,
        deployment: Deployment,
    },
    Failed {
        build_id: BuildId,
        error: String,
    },
}

/// Everything the pipeline talks to.
pub struct PipelineDeps {
    pub builds: Arc<dyn BuildRepo>,
    pub projects: Arc<dyn ProjectRepo>,
    pub credentials: Arc<CredentialResolver>,
    pub source: Arc<dyn SourceFetcher>,
    pub executor: Arc<BuildExecutor>,
    pub publisher: Arc<ArtifactPublisher>,
    pub lease: Arc<dyn ProjectLease>,
    pub workspace: Workspace,
    pub defaults: BuildDefaults,
}

pub struct BuildPipeline {
    deps: PipelineDeps,
}

impl BuildPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self { deps }
    }

    /// Handle one queue message.
    pub async fn handle(&self, payload: &str) -> Result<JobOutcome> {
        let build_id = match parse_message(payload) {
            Ok(id) => id,
            Err(e) => {
                warn!(payload = %payload, error = %e, "Dropping malformed message");
                return Ok(JobOutcome::Dropped);
            }
        };

        let ctx = match self.load(build_id).await {
            Ok(Some(ctx)) => ctx,
            Ok(None) => return Ok(JobOutcome::Skipped(build_id)),
            Err(e) => {
                error!(build_id = %build_id, error = %e, "Failed to load build");
                return Ok(self.fail(build_id, e).await);
            }
        };

        match self.deps.builds.mark_running(build_id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(build_id = %build_id, "Build is no longer queued, skipping");
                return Ok(JobOutcome::Skipped(build_id));
            }
            Err(e) => {
                error!(build_id = %build_id, error = %e, "Cannot record running state");
                return Err(e.into());
            }
        }

        info!(build_id = %build_id, project = %ctx.project_name, "Build started");

        let outcome = match self.run(&ctx).await {
            Ok(deployment) => match self.succeed(build_id).await {
                Ok(()) => {
                    info!(build_id = %build_id, project = %ctx.project_name, "Build succeeded");
                    JobOutcome::Succeeded {
                        build_id,
                        deployment,
                    }
                }
                Err(e) => self.fail(build_id, e).await,
            },
            Err(e) => {
                warn!(build_id = %build_id, project = %ctx.project_name, error = %e, "Build failed");
                self.fail(build_id, e).await
            }
        };

        if let Err(e) = self.deps.workspace.cleanup(build_id).await {
            warn!(build_id = %build_id, error = %e, "Failed to clean up working directory");
        }

        Ok(outcome)
    }

    /// Resolve the job context. `None` when the build is not queued.
    async fn load(&self, build_id: BuildId) -> Result<Option<JobContext>> {
        let build = self.deps.builds.get_build(build_id).await?;
        if build.status != BuildStatus::Queued {
            warn!(build_id = %build_id, status = %build.status, "Build is not queued, skipping");
            return Ok(None);
        }
        let project = self.deps.projects.get_project(build.project_id).await?;
        Ok(Some(JobContext::new(&build, &project, &self.deps.defaults)?))
    }

    async fn run(&self, ctx: &JobContext) -> Result<Deployment> {
        let executor = &self.deps.executor;

        self.log(
            ctx.build_id,
            &format!(
                "[CMD] got installation ({}) and build ({}) commands",
                ctx.install_command, ctx.build_command
            ),
        )
        .await?;
        executor.validate_command(&ctx.install_command)?;
        executor.validate_command(&ctx.build_command)?;

        let token = self.deps.credentials.get_access_token(ctx.user_id).await?;
        let url = self
            .deps
            .source
            .resolve_archive_url(ctx.repository_id, &token)
            .await?;
        let working_dir = self
            .deps
            .source
            .fetch_and_extract(&url, &token, ctx.build_id)
            .await?;
        self.log(
            ctx.build_id,
            &format!(
                "[CLONE] Extracted repository and placed at {}",
                working_dir.source.display()
            ),
        )
        .await?;

        let project_dir = ctx.project_dir(&working_dir);
        let env = executor
            .prepare_environment(&ctx.runtime_version, ctx.project_id)
            .await?;

        for (stage, command) in [
            (Stage::Install, &ctx.install_command),
            (Stage::Build, &ctx.build_command),
        ] {
            self.log(ctx.build_id, stage.banner()).await?;
            let output = executor
                .run_stage(stage, command, &project_dir, &env)
                .await?;
            if !output.is_empty() {
                self.log(ctx.build_id, &output).await?;
            }
        }

        executor
            .verify_output(&ctx.output_dir(&working_dir), &ctx.output_directory)
            .await?;

        let mut lease = self.deps.lease.acquire(ctx.project_id).await?;
        let result = self.publish(ctx, &working_dir).await;
        if let Err(e) = lease.release().await {
            warn!(project_id = %ctx.project_id, error = %e, "Failed to release publish lease");
        }
        result
    }

    async fn publish(&self, ctx: &JobContext, working_dir: &WorkingDirectory) -> Result<Deployment> {
        self.deps.publisher.publish(ctx, working_dir).await?;
        self.deps.publisher.activate(ctx).await
    }

    async fn log(&self, build_id: BuildId, line: &str) -> Result<()> {
        self.deps.builds.append_log(build_id, line).await?;
        Ok(())
    }

    async fn succeed(&self, build_id: BuildId) -> Result<()> {
        self.log(build_id, "Completed").await?;
        if !self
            .deps
            .builds
            .finish(build_id, BuildStatus::Success)
            .await?
        {
            warn!(build_id = %build_id, "Build was already terminal");
        }
        Ok(())
    }

    /// Record a failure. Bookkeeping errors are logged, never raised.
    async fn fail(&self, build_id: BuildId, err: Error) -> JobOutcome {
        let message = err.to_string();
        if let Err(e) = self.log(build_id, &message).await {
            warn!(build_id = %build_id, error = %e, "Failed to write error to build log");
        }
        match self.deps.builds.finish(build_id, BuildStatus::Failure).await {
            Ok(true) => {}
            Ok(false) => warn!(build_id = %build_id, "Build was already terminal"),
            Err(e) => warn!(build_id = %build_id, error = %e, "Failed to mark build failed"),
        }
        JobOutcome::Failed {
            build_id,
            error: message,
        }
    }
}
