//! Build jobs, projects and the per-job context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use crate::source::WorkingDirectory;
use crate::{BuildId, Error, ProjectId, Result, UserId};

/// Status of a build. Transitions only move forward:
/// `queued -> running -> {success, failure}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Queued,
    Running,
    Success,
    Failure,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Queued => "queued",
            BuildStatus::Running => "running",
            BuildStatus::Success => "success",
            BuildStatus::Failure => "failure",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStatus::Success | BuildStatus::Failure)
    }

    /// Whether moving from `self` to `next` is a legal forward transition.
    ///
    /// A queued build may fail directly when it cannot even be loaded.
    pub fn can_transition_to(&self, next: BuildStatus) -> bool {
        matches!(
            (self, next),
            (BuildStatus::Queued, BuildStatus::Running)
                | (BuildStatus::Queued, BuildStatus::Failure)
                | (BuildStatus::Running, BuildStatus::Success)
                | (BuildStatus::Running, BuildStatus::Failure)
        )
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(BuildStatus::Queued),
            "running" => Ok(BuildStatus::Running),
            "success" => Ok(BuildStatus::Success),
            "failure" => Ok(BuildStatus::Failure),
            other => Err(Error::InvalidInput(format!("unknown build status '{other}'"))),
        }
    }
}

/// A request to build and publish one project revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub id: BuildId,
    pub project_id: ProjectId,
    pub commit_hash: Option<String>,
    /// What triggered the build (e.g. "manual", "push").
    pub triggered_by: String,
    pub status: BuildStatus,
    /// Append-only log text.
    pub logs: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Project settings. Optional fields fall back to [`BuildDefaults`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub user_id: UserId,
    pub name: String,
    /// Numeric repository id at the VCS provider.
    pub repository_id: i64,
    pub source_directory: Option<String>,
    pub install_command: Option<String>,
    pub build_command: Option<String>,
    pub output_directory: Option<String>,
    pub runtime_version: Option<String>,
}

/// Values used when a project leaves a setting empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildDefaults {
    pub install_command: String,
    pub build_command: String,
    pub output_directory: String,
    pub runtime_version: String,
    pub source_directory: String,
}

impl Default for BuildDefaults {
    fn default() -> Self {
        Self {
            install_command: "npm install".to_string(),
            build_command: "npm run build".to_string(),
            output_directory: "dist".to_string(),
            runtime_version: "20".to_string(),
            source_directory: "./".to_string(),
        }
    }
}

/// Everything a pipeline stage needs to know about the job, resolved once
/// after the build and project rows are loaded.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub build_id: BuildId,
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub project_name: String,
    pub repository_id: i64,
    pub commit_hash: Option<String>,
    /// Relative subdirectory of the extracted source, `None` for the root.
    pub source_directory: Option<String>,
    pub install_command: String,
    pub build_command: String,
    /// Output directory with a single leading separator, e.g. `/dist`.
    pub output_directory: String,
    pub runtime_version: String,
}

impl JobContext {
    pub fn new(build: &Build, project: &Project, defaults: &BuildDefaults) -> Result<Self> {
        let pick = |value: &Option<String>, default: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
                .to_string()
        };

        let source_directory = pick(&project.source_directory, &defaults.source_directory);
        let output_directory = pick(&project.output_directory, &defaults.output_directory);

        Ok(Self {
            build_id: build.id,
            project_id: project.id,
            user_id: project.user_id,
            project_name: project.name.clone(),
            repository_id: project.repository_id,
            commit_hash: build.commit_hash.clone(),
            source_directory: normalize_source_directory(&source_directory)?,
            install_command: pick(&project.install_command, &defaults.install_command),
            build_command: pick(&project.build_command, &defaults.build_command),
            output_directory: normalize_output_directory(&output_directory)?,
            runtime_version: pick(&project.runtime_version, &defaults.runtime_version),
        })
    }

    /// Directory the install and build commands run in.
    pub fn project_dir(&self, working_dir: &WorkingDirectory) -> PathBuf {
        match &self.source_directory {
            Some(sub) => working_dir.source.join(sub),
            None => working_dir.source.clone(),
        }
    }

    /// Directory the build is expected to produce.
    pub fn output_dir(&self, working_dir: &WorkingDirectory) -> PathBuf {
        let relative = self.output_directory.trim_start_matches('/');
        if relative.is_empty() {
            self.project_dir(working_dir)
        } else {
            self.project_dir(working_dir).join(relative)
        }
    }
}

fn strip_separators(dir: &str) -> &str {
    let mut dir = dir.trim();
    while let Some(rest) = dir.strip_prefix("./") {
        dir = rest;
    }
    dir.trim_start_matches('/').trim_end_matches('/')
}

fn reject_parent_components(field: &str, dir: &str) -> Result<()> {
    if Path::new(dir)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(Error::Configuration(format!(
            "{field} '{dir}' must stay inside the repository"
        )));
    }
    Ok(())
}

/// `./`, `/` and the empty string all mean the repository root.
pub fn normalize_source_directory(dir: &str) -> Result<Option<String>> {
    let stripped = strip_separators(dir);
    reject_parent_components("source directory", stripped)?;
    if stripped.is_empty() || stripped == "." {
        Ok(None)
    } else {
        Ok(Some(stripped.to_string()))
    }
}

/// Normalize to exactly one leading separator: `dist`, `./dist/` and `//dist`
/// all become `/dist`.
pub fn normalize_output_directory(dir: &str) -> Result<String> {
    let stripped = strip_separators(dir);
    reject_parent_components("output directory", stripped)?;
    if stripped == "." {
        return Ok("/".to_string());
    }
    Ok(format!("/{stripped}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> Build {
        Build {
            id: BuildId::new(42),
            project_id: ProjectId::new(1),
            commit_hash: Some("abc123".to_string()),
            triggered_by: "manual".to_string(),
            status: BuildStatus::Queued,
            logs: None,
            start_time: None,
            end_time: None,
        }
    }

    fn project() -> Project {
        Project {
            id: ProjectId::new(1),
            user_id: UserId::new(9),
            name: "blog".to_string(),
            repository_id: 1234,
            source_directory: None,
            install_command: None,
            build_command: Some("npm run build:prod".to_string()),
            output_directory: Some("./dist".to_string()),
            runtime_version: Some("  ".to_string()),
        }
    }

    #[test]
    fn test_status_transitions_only_move_forward() {
        use BuildStatus::*;
        assert!(Queued.can_transition_to(Running));
        assert!(Queued.can_transition_to(Failure));
        assert!(Running.can_transition_to(Success));
        assert!(Running.can_transition_to(Failure));

        assert!(!Queued.can_transition_to(Success));
        assert!(!Running.can_transition_to(Queued));
        assert!(!Success.can_transition_to(Failure));
        assert!(!Failure.can_transition_to(Running));
        assert!(!Success.can_transition_to(Success));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("running".parse::<BuildStatus>().unwrap(), BuildStatus::Running);
        assert!("done".parse::<BuildStatus>().is_err());
    }

    #[test]
    fn test_output_directory_normalization() {
        assert_eq!(normalize_output_directory("dist").unwrap(), "/dist");
        assert_eq!(normalize_output_directory("./dist").unwrap(), "/dist");
        assert_eq!(normalize_output_directory("//build/out/").unwrap(), "/build/out");
        assert_eq!(normalize_output_directory(".").unwrap(), "/");
        assert!(normalize_output_directory("../etc").unwrap_err().is_configuration());
    }

    #[test]
    fn test_source_directory_normalization() {
        assert_eq!(normalize_source_directory("./").unwrap(), None);
        assert_eq!(normalize_source_directory("").unwrap(), None);
        assert_eq!(
            normalize_source_directory("./packages/web/").unwrap(),
            Some("packages/web".to_string())
        );
        assert!(normalize_source_directory("a/../../b").is_err());
    }

    #[test]
    fn test_context_applies_defaults() {
        let ctx = JobContext::new(&build(), &project(), &BuildDefaults::default()).unwrap();

        assert_eq!(ctx.install_command, "npm install");
        assert_eq!(ctx.build_command, "npm run build:prod");
        assert_eq!(ctx.output_directory, "/dist");
        assert_eq!(ctx.runtime_version, "20");
        assert_eq!(ctx.source_directory, None);
        assert_eq!(ctx.user_id, UserId::new(9));
    }

    #[test]
    fn test_context_paths() {
        let mut p = project();
        p.source_directory = Some("site".to_string());
        let ctx = JobContext::new(&build(), &p, &BuildDefaults::default()).unwrap();
        let wd = WorkingDirectory {
            root: PathBuf::from("/tmp/deployio/42"),
            source: PathBuf::from("/tmp/deployio/42/owner-repo-abc123"),
        };

        assert_eq!(
            ctx.project_dir(&wd),
            PathBuf::from("/tmp/deployio/42/owner-repo-abc123/site")
        );
        assert_eq!(
            ctx.output_dir(&wd),
            PathBuf::from("/tmp/deployio/42/owner-repo-abc123/site/dist")
        );
    }
}
