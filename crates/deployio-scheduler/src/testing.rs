//! In-memory stand-ins for every collaborator of the pipeline.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use deployio_core::artifact::ArtifactStore;
use deployio_core::credential::{Credential, TokenPair};
use deployio_core::deployment::Deployment;
use deployio_core::job::{Build, BuildDefaults, BuildStatus, Project};
use deployio_core::runtime::RuntimeSelector;
use deployio_core::secret::SecretMaterializer;
use deployio_core::source::{SourceFetcher, WorkingDirectory, Workspace};
use deployio_core::{BuildId, ProjectId, UserId};
use deployio_db::{
    BuildRepo, CredentialRepo, DbError, DbResult, DeploymentRepo, EnvironmentRecord, Lease,
    LeaseGuard, ProjectLease, ProjectRepo,
};
use deployio_deployer::{ArtifactPublisher, ObjectArtifactStore};
use deployio_executor::BuildExecutor;
use deployio_github::{CredentialResolver, GitHubError, GitHubResult, OAuthGrant, TokenExchange, TokenResponse};
use object_store::memory::InMemory;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::queue::{BuildQueue, Delivery};
use crate::{BuildPipeline, PipelineDeps, QueueResult};

pub const BLOG_BUILD_SCRIPT: &str = "mkdir -p dist/assets\n\
echo '<h1>blog</h1>' > dist/index.html\n\
echo 'console.log(1)' > dist/assets/app.js\n";

const TOKEN: &str = "ghu_stored";

#[derive(Default)]
pub struct MemoryBuilds {
    builds: Mutex<HashMap<BuildId, Build>>,
    pub writes: AtomicUsize,
    pub fail_mark_running: AtomicBool,
}

impl MemoryBuilds {
    pub fn insert(&self, id: i64, status: BuildStatus) {
        let build = Build {
            id: BuildId::new(id),
            project_id: ProjectId::new(1),
            commit_hash: Some("4f1c2b9".to_string()),
            triggered_by: "push".to_string(),
            status,
            logs: None,
            start_time: None,
            end_time: None,
        };
        self.builds.lock().unwrap().insert(build.id, build);
    }

    pub fn get(&self, id: i64) -> Build {
        self.builds.lock().unwrap()[&BuildId::new(id)].clone()
    }

    pub fn set_status(&self, id: i64, status: BuildStatus) {
        if let Some(build) = self.builds.lock().unwrap().get_mut(&BuildId::new(id)) {
            build.status = status;
        }
    }
}

#[async_trait]
impl BuildRepo for MemoryBuilds {
    async fn get_build(&self, id: BuildId) -> DbResult<Build> {
        self.builds
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("build {}", id)))
    }

    async fn mark_running(&self, id: BuildId) -> DbResult<bool> {
        if self.fail_mark_running.load(Ordering::SeqCst) {
            return Err(DbError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut builds = self.builds.lock().unwrap();
        match builds.get_mut(&id) {
            Some(build) if build.status == BuildStatus::Queued => {
                build.status = BuildStatus::Running;
                build.start_time = Some(Utc::now());
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_log(&self, id: BuildId, line: &str) -> DbResult<()> {
        let mut builds = self.builds.lock().unwrap();
        let build = builds
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("build {}", id)))?;
        build.logs = Some(match build.logs.take() {
            Some(logs) => format!("{}\n{}", logs, line),
            None => line.to_string(),
        });
        build.end_time = Some(Utc::now());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn finish(&self, id: BuildId, status: BuildStatus) -> DbResult<bool> {
        let mut builds = self.builds.lock().unwrap();
        match builds.get_mut(&id) {
            Some(build) if build.status.can_transition_to(status) => {
                build.status = status;
                build.end_time = Some(Utc::now());
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryProjects {
    projects: Mutex<HashMap<ProjectId, Project>>,
}

impl MemoryProjects {
    pub fn insert(&self, project: Project) {
        self.projects.lock().unwrap().insert(project.id, project);
    }

    pub fn remove(&self, id: ProjectId) {
        self.projects.lock().unwrap().remove(&id);
    }

    pub fn set_install_command(&self, command: &str) {
        for project in self.projects.lock().unwrap().values_mut() {
            project.install_command = Some(command.to_string());
        }
    }
}

#[async_trait]
impl ProjectRepo for MemoryProjects {
    async fn get_project(&self, id: ProjectId) -> DbResult<Project> {
        self.projects
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("project {}", id)))
    }

    async fn list_environment(&self, _project_id: ProjectId) -> DbResult<Vec<EnvironmentRecord>> {
        Ok(Vec::new())
    }
}

pub struct MemoryCredentials {
    credential: Mutex<Credential>,
}

impl MemoryCredentials {
    fn valid(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            credential: Mutex::new(Credential {
                user_id,
                tokens: TokenPair {
                    access_token: TOKEN.to_string(),
                    access_expires_at: now + ChronoDuration::hours(8),
                    refresh_token: "ghr_stored".to_string(),
                    refresh_expires_at: now + ChronoDuration::days(180),
                },
            }),
        }
    }

    /// Push both expiries `ago` into the past.
    pub fn expire(&self, ago: ChronoDuration) {
        let mut credential = self.credential.lock().unwrap();
        let past = Utc::now() - ago;
        credential.tokens.access_expires_at = past;
        credential.tokens.refresh_expires_at = past;
    }
}

#[async_trait]
impl CredentialRepo for MemoryCredentials {
    async fn get_credential(&self, _user_id: UserId) -> DbResult<Credential> {
        Ok(self.credential.lock().unwrap().clone())
    }

    async fn update_tokens(&self, _user_id: UserId, tokens: &TokenPair) -> DbResult<()> {
        self.credential.lock().unwrap().tokens = tokens.clone();
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingExchange {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TokenExchange for CountingExchange {
    async fn exchange(&self, _grant: &OAuthGrant) -> GitHubResult<TokenResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GitHubError::Provider {
            code: "bad_refresh_token".to_string(),
            description: "The refresh token passed is incorrect or expired.".to_string(),
        })
    }
}

/// Writes a fixed source tree instead of downloading one.
pub struct FakeSource {
    workspace: Workspace,
    build_script: String,
    pub fetches: AtomicUsize,
}

#[async_trait]
impl SourceFetcher for FakeSource {
    async fn resolve_archive_url(
        &self,
        repository_id: i64,
        access_token: &str,
    ) -> deployio_core::Result<String> {
        assert_eq!(access_token, TOKEN);
        Ok(format!("https://api.github.com/repositories/{repository_id}/tarball"))
    }

    async fn fetch_and_extract(
        &self,
        _url: &str,
        access_token: &str,
        build_id: BuildId,
    ) -> deployio_core::Result<WorkingDirectory> {
        assert_eq!(access_token, TOKEN);
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let root = self.workspace.job_root(build_id);
        let source = root.join("acme-blog-4f1c2b9");
        tokio::fs::create_dir_all(&source).await?;
        tokio::fs::write(source.join("install.sh"), "echo installed\n").await?;
        tokio::fs::write(source.join("build.sh"), &self.build_script).await?;
        Ok(WorkingDirectory { root, source })
    }
}

struct StaticRuntime;

#[async_trait]
impl RuntimeSelector for StaticRuntime {
    async fn resolve_runtime_environment(
        &self,
        version: &str,
    ) -> deployio_core::Result<HashMap<String, String>> {
        Ok(HashMap::from([("NODE_VERSION".to_string(), version.to_string())]))
    }
}

struct NoSecrets;

#[async_trait]
impl SecretMaterializer for NoSecrets {
    async fn materialize(&self, _project_id: ProjectId) -> deployio_core::Result<Vec<(String, String)>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct MemoryDeployments {
    rows: Mutex<Vec<Deployment>>,
}

#[async_trait]
impl DeploymentRepo for MemoryDeployments {
    async fn activate(&self, project_id: ProjectId, build_id: BuildId) -> DbResult<Deployment> {
        let mut rows = self.rows.lock().unwrap();
        for row in rows.iter_mut().filter(|r| r.project_id == project_id) {
            row.active = false;
        }
        let deployment = Deployment {
            id: rows.len() as i64 + 1,
            project_id,
            build_id,
            active: true,
            created_at: Utc::now(),
        };
        rows.push(deployment.clone());
        Ok(deployment)
    }

    async fn active_deployment(&self, project_id: ProjectId) -> DbResult<Option<Deployment>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.project_id == project_id && r.active)
            .cloned())
    }

    async fn list_deployments(&self, project_id: ProjectId) -> DbResult<Vec<Deployment>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct CountingLease {
    pub acquired: AtomicUsize,
    pub released: Arc<AtomicUsize>,
}

struct HeldLease(Arc<AtomicUsize>);

#[async_trait]
impl Lease for HeldLease {
    async fn release(&mut self) -> DbResult<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ProjectLease for CountingLease {
    async fn acquire(&self, _project_id: ProjectId) -> DbResult<LeaseGuard> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(HeldLease(self.released.clone())))
    }
}

#[derive(Default)]
pub struct MemoryQueue {
    pending: Mutex<VecDeque<Delivery>>,
    next_id: AtomicUsize,
    pub acked: Mutex<Vec<i64>>,
}

#[async_trait]
impl BuildQueue for MemoryQueue {
    async fn enqueue(&self, payload: &str) -> QueueResult<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        self.pending.lock().unwrap().push_back(Delivery {
            id,
            payload: payload.to_string(),
            enqueued_at: Utc::now(),
        });
        Ok(id)
    }

    async fn claim(&self, _worker_id: &str) -> QueueResult<Option<Delivery>> {
        Ok(self.pending.lock().unwrap().pop_front())
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.acked.lock().unwrap().push(delivery.id);
        Ok(())
    }
}

/// A pipeline for project 1 ("blog") with build 41 live and build 42 queued.
pub struct Harness {
    pub pipeline: Arc<BuildPipeline>,
    pub builds: Arc<MemoryBuilds>,
    pub projects: Arc<MemoryProjects>,
    pub credentials: Arc<MemoryCredentials>,
    pub exchange: Arc<CountingExchange>,
    pub source: Arc<FakeSource>,
    pub store: Arc<ObjectArtifactStore>,
    pub deployments: Arc<MemoryDeployments>,
    pub lease: Arc<CountingLease>,
    pub workspace: Workspace,
    _tmp: TempDir,
}

impl Harness {
    pub async fn new(build_script: &str, stage_timeout: Duration) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(tmp.path().join("work"));
        workspace.ensure().await.unwrap();

        let builds = Arc::new(MemoryBuilds::default());
        builds.insert(41, BuildStatus::Success);
        builds.insert(42, BuildStatus::Queued);

        let projects = Arc::new(MemoryProjects::default());
        projects.insert(Project {
            id: ProjectId::new(1),
            user_id: UserId::new(7),
            name: "blog".to_string(),
            repository_id: 1296269,
            source_directory: Some("./".to_string()),
            install_command: Some("sh install.sh".to_string()),
            build_command: Some("sh build.sh".to_string()),
            output_directory: Some("./dist".to_string()),
            runtime_version: Some("20".to_string()),
        });

        let credentials = Arc::new(MemoryCredentials::valid(UserId::new(7)));
        let exchange = Arc::new(CountingExchange::default());
        let source = Arc::new(FakeSource {
            workspace: workspace.clone(),
            build_script: build_script.to_string(),
            fetches: AtomicUsize::new(0),
        });

        let store = Arc::new(ObjectArtifactStore::new(Arc::new(InMemory::new())));
        let previous = tmp.path().join("old-41.js");
        std::fs::write(&previous, "console.log(41)").unwrap();
        store.put_file("blog/old-41.js", &previous).await.unwrap();

        let deployments = Arc::new(MemoryDeployments::default());
        deployments
            .activate(ProjectId::new(1), BuildId::new(41))
            .await
            .unwrap();

        let lease = Arc::new(CountingLease::default());

        let executor = Arc::new(BuildExecutor::new(
            "sh",
            stage_timeout,
            Arc::new(StaticRuntime),
            Arc::new(NoSecrets),
        ));

        let pipeline = Arc::new(BuildPipeline::new(PipelineDeps {
            builds: builds.clone(),
            projects: projects.clone(),
            credentials: Arc::new(CredentialResolver::new(
                credentials.clone(),
                exchange.clone(),
            )),
            source: source.clone(),
            executor,
            publisher: Arc::new(ArtifactPublisher::new(store.clone(), deployments.clone())),
            lease: lease.clone(),
            workspace: workspace.clone(),
            defaults: BuildDefaults::default(),
        }));

        Self {
            pipeline,
            builds,
            projects,
            credentials,
            exchange,
            source,
            store,
            deployments,
            lease,
            workspace,
            _tmp: tmp,
        }
    }
}
