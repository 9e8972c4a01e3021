//! Worker configuration.

use clap::{Args, CommandFactory, Parser, ValueEnum};
use deployio_core::job::BuildDefaults;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// OAuth client and VCS provider endpoints.
#[derive(Debug, Clone, Args)]
pub struct OAuthConfig {
    /// OAuth application client id
    #[arg(long, env = "GITHUB_CLIENT_ID")]
    pub client_id: String,

    /// OAuth application client secret
    #[arg(long, env = "GITHUB_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Token endpoint used for code and refresh-token exchanges
    #[arg(
        long,
        env = "GITHUB_OAUTH_TOKEN_URL",
        default_value = "https://github.com/login/oauth/access_token"
    )]
    pub token_url: Url,

    /// Base URL of the repository API
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    pub api_url: Url,
}

/// S3-compatible object store holding published artifacts.
#[derive(Debug, Clone, Args)]
pub struct ObjectStoreConfig {
    /// Endpoint of the S3-compatible store (e.g. a MinIO server)
    #[arg(long = "s3-endpoint", env = "S3_ENDPOINT")]
    pub endpoint: Url,

    #[arg(long = "s3-bucket", env = "S3_BUCKET")]
    pub bucket: String,

    #[arg(long = "s3-access-key-id", env = "S3_ACCESS_KEY_ID")]
    pub access_key_id: String,

    #[arg(
        long = "s3-secret-access-key",
        env = "S3_SECRET_ACCESS_KEY",
        hide_env_values = true
    )]
    pub secret_access_key: String,

    #[arg(long = "s3-region", env = "S3_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Allow plain-HTTP endpoints
    #[arg(long = "s3-allow-http", env = "S3_ALLOW_HTTP", default_value_t = false)]
    pub allow_http: bool,
}

const MIN_DATABASE_CONNECTIONS: u32 = 2;

/// Configuration for one worker process.

#[derive(Debug, Clone, Parser)]
#[command(name = "deployio-worker")]
#[command(about = "Builds queued projects and publishes them as static sites", long_about = None)]
pub struct WorkerConfig {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// Pool size. The publish lease pins one connection while the deployment
    /// switch uses another, so at least 2 are needed.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    pub database_max_connections: u32,

    #[command(flatten)]
    pub oauth: OAuthConfig,

    #[command(flatten)]
    pub object_store: ObjectStoreConfig,

    /// Symmetric key that decrypts project environment values (16, 24 or 32 bytes)
    #[arg(long, env = "ENV_SECRET", hide_env_values = true)]
    pub env_secret: String,

    /// Shared temp root for downloads and working directories
    #[arg(long, env = "DEPLOYIO_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// The only program install and build commands may invoke
    #[arg(long, env = "DEPLOYIO_PACKAGE_MANAGER", default_value = "npm")]
    pub package_manager: String,

    /// Wall-clock deadline for each of install and build, in seconds
    #[arg(long, env = "DEPLOYIO_STAGE_TIMEOUT_SECS", default_value_t = 300)]
    pub stage_timeout_secs: u64,

    /// Runtime version manager directory (defaults to ~/.nvm)
    #[arg(long, env = "NVM_DIR")]
    pub nvm_dir: Option<PathBuf>,

    #[arg(long, env = "DEFAULT_INSTALL_COMMAND", default_value = "npm install")]
    pub default_install_command: String,

    #[arg(long, env = "DEFAULT_BUILD_COMMAND", default_value = "npm run build")]
    pub default_build_command: String,

    #[arg(long, env = "DEFAULT_OUTPUT_DIRECTORY", default_value = "dist")]
    pub default_output_directory: String,

    #[arg(long, env = "DEFAULT_RUNTIME_VERSION", default_value = "20")]
    pub default_runtime_version: String,

    #[arg(long, env = "DEFAULT_SOURCE_DIRECTORY", default_value = "./")]
    pub default_source_directory: String,

    /// Idle back-off when the queue is empty, in milliseconds
    #[arg(long, env = "DEPLOYIO_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Check values clap cannot check on its own.
    pub fn validate(&self) -> ConfigResult<()> {
        self.secret_key()?;

        if self.package_manager.trim().is_empty()
            || self.package_manager.contains(char::is_whitespace)
        {
            return Err(ConfigError::InvalidValue {
                field: "package_manager".to_string(),
                message: "must be a single program name".to_string(),
            });
        }

        if self.database_max_connections < MIN_DATABASE_CONNECTIONS {
            return Err(ConfigError::InvalidValue {
                field: "database_max_connections".to_string(),
                message: format!(
                    "must be at least {MIN_DATABASE_CONNECTIONS}, got {}",
                    self.database_max_connections
                ),
            });
        }

        if self.stage_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "stage_timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.oauth.client_id.trim().is_empty() {
            return Err(ConfigError::MissingField("client_id".to_string()));
        }
        if self.oauth.client_secret.trim().is_empty() {
            return Err(ConfigError::MissingField("client_secret".to_string()));
        }

        Ok(())
    }

    /// Raw AES key bytes, sized for AES-128, AES-192 or AES-256.
    pub fn secret_key(&self) -> ConfigResult<Vec<u8>> {
        let key = self.env_secret.as_bytes();
        match key.len() {
            16 | 24 | 32 => Ok(key.to_vec()),
            0 => Err(ConfigError::MissingField("env_secret".to_string())),
            n => Err(ConfigError::InvalidValue {
                field: "env_secret".to_string(),
                message: format!("key must be 16, 24 or 32 bytes, got {n}"),
            }),
        }
    }

    /// Environment variables carrying credentials for the worker itself.
    pub fn secret_env_keys() -> Vec<String> {
        Self::command()
            .get_arguments()
            .filter(|arg| arg.is_hide_env_values_set())
            .filter_map(|arg| arg.get_env())
            .map(|key| key.to_string_lossy().into_owned())
            .collect()
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("deployio"))
    }

    pub fn nvm_dir(&self) -> PathBuf {
        self.nvm_dir.clone().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_default()
                .join(".nvm")
        })
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn build_defaults(&self) -> BuildDefaults {
        BuildDefaults {
            install_command: self.default_install_command.clone(),
            build_command: self.default_build_command.clone(),
            output_directory: self.default_output_directory.clone(),
            runtime_version: self.default_runtime_version.clone(),
            source_directory: self.default_source_directory.clone(),
        }
    }
}
