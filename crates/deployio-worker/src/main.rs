//! deployio build worker

use clap::Parser;
use deployio_config::{LogFormat, WorkerConfig};
use deployio_core::source::Workspace;
use deployio_db::{
    PgBuildRepo, PgCredentialRepo, PgDeploymentRepo, PgProjectLease, PgProjectRepo, create_pool,
};
use deployio_deployer::{ArtifactPublisher, ObjectArtifactStore};
use deployio_executor::{
    ArchiveSourceFetcher, BuildExecutor, EncryptedEnvMaterializer, NvmRuntimeSelector,
};
use deployio_github::{CredentialResolver, GitHubOAuthClient, GitHubRepositoryClient};
use deployio_scheduler::{BuildPipeline, PgBuildQueue, PipelineDeps, Worker};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, finishing current job");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::parse();
    init_tracing(config.log_format);
    config.validate()?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database_url, config.database_max_connections).await?;
    info!("Database connected");

    let workspace = Workspace::new(config.work_dir());
    if workspace.ensure().await? {
        info!(path = %workspace.root().display(), "Created work directory");
    } else {
        info!(path = %workspace.root().display(), "Using existing work directory");
    }

    let builds = Arc::new(PgBuildRepo::new(pool.clone()));
    let projects = Arc::new(PgProjectRepo::new(pool.clone()));

    let oauth = Arc::new(GitHubOAuthClient::new(
        config.oauth.client_id.clone(),
        config.oauth.client_secret.clone(),
        config.oauth.token_url.clone(),
    ));
    let credentials = Arc::new(CredentialResolver::new(
        Arc::new(PgCredentialRepo::new(pool.clone())),
        oauth,
    ));

    let repositories = Arc::new(GitHubRepositoryClient::new(config.oauth.api_url.clone()));
    let source = Arc::new(ArchiveSourceFetcher::new(repositories, workspace.clone()));

    let executor = Arc::new(BuildExecutor::new(
        config.package_manager.clone(),
        config.stage_timeout(),
        Arc::new(NvmRuntimeSelector::new(config.nvm_dir())),
        Arc::new(EncryptedEnvMaterializer::new(
            projects.clone(),
            config.secret_key()?,
        )),
    )
    .with_withheld_env(WorkerConfig::secret_env_keys()));

    let store = Arc::new(ObjectArtifactStore::s3(&config.object_store)?);
    let publisher = Arc::new(ArtifactPublisher::new(
        store,
        Arc::new(PgDeploymentRepo::new(pool.clone())),
    ));

    let pipeline = Arc::new(BuildPipeline::new(PipelineDeps {
        builds,
        projects,
        credentials,
        source,
        executor,
        publisher,
        lease: Arc::new(PgProjectLease::new(pool.clone())),
        workspace,
        defaults: config.build_defaults(),
    }));

    let worker_id = format!("worker-{}", uuid::Uuid::now_v7());
    let worker = Worker::new(
        worker_id,
        Arc::new(PgBuildQueue::new(pool)),
        pipeline,
        config.poll_interval(),
    );

    worker.run(shutdown_signal()).await?;
    Ok(())
}
