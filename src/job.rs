//! The unit of work threaded through every stage: which repository, which
//! commit, and the configuration in effect.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::UnitgraphConfig;
use crate::container::Executor;
use crate::error::{ConfigurationError, JobError};

/// Per-repository configuration file at the repository root.
pub const REPO_CONFIG_FILE: &str = "unitgraph.yml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Overrides the URI derived from the git remote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Toolchain name to toolchain-specific settings.
    #[serde(default)]
    pub toolchains: BTreeMap<String, serde_yaml::Value>,
}

impl RepositoryConfig {
    /// Reads `unitgraph.yml` from `repo_dir`; a missing file yields defaults.
    pub fn load(repo_dir: &Path) -> Result<Self, JobError> {
        let path = repo_dir.join(REPO_CONFIG_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(JobError::Io { path, source }),
        };
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text).map_err(|source| JobError::InvalidConfig { path, source })
    }

    /// Typed settings of one toolchain, or defaults when it has none.
    pub fn toolchain<T>(&self, name: &str) -> Result<T, ConfigurationError>
    where
        T: DeserializeOwned + Default,
    {
        match self.toolchains.get(name) {
            None | Some(serde_yaml::Value::Null) => Ok(T::default()),
            Some(value) => serde_yaml::from_value(value.clone()).map_err(|e| {
                ConfigurationError::InvalidToolchainConfig {
                    toolchain: name.to_string(),
                    message: e.to_string(),
                }
            }),
        }
    }
}

/// Scheme-less repository URI such as `github.com/acme/app`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoUri(String);

impl RepoUri {
    /// Normalizes clone URLs and remotes: drops the scheme, credentials and a
    /// trailing `.git`, and turns scp-style `git@host:path` into `host/path`.
    pub fn parse(raw: &str) -> Self {
        let mut s = raw.trim();
        for scheme in ["https://", "http://", "ssh://", "git://", "git+ssh://"] {
            if let Some(rest) = s.strip_prefix(scheme) {
                s = rest;
                break;
            }
        }

        let mut uri = s.to_string();
        if let Some((user, rest)) = uri.split_once('@') {
            if !user.contains('/') {
                uri = rest.to_string();
            }
        }
        // scp-style remote
        if !raw.contains("://") {
            if let Some((host, path)) = uri.split_once(':') {
                if !host.contains('/') {
                    uri = format!("{}/{}", host, path);
                }
            }
        }

        let uri = uri.trim_end_matches('/');
        let uri = uri.strip_suffix(".git").unwrap_or(uri);
        Self(uri.trim_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct JobContext {
    pub repo_dir: PathBuf,
    pub commit_id: String,
    pub repo_uri: RepoUri,
    pub repo: RepositoryConfig,
    pub config: Arc<UnitgraphConfig>,
    pub executor: Arc<Executor>,
}

impl JobContext {
    pub fn new(
        repo_dir: impl Into<PathBuf>,
        commit_id: impl Into<String>,
        repo_uri: RepoUri,
        repo: RepositoryConfig,
        config: Arc<UnitgraphConfig>,
        executor: Arc<Executor>,
    ) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            commit_id: commit_id.into(),
            repo_uri,
            repo,
            config,
            executor,
        }
    }

    /// Builds a context for the repository checked out at `dir`.
    ///
    /// The commit comes from `commit` or `git rev-parse HEAD`. The URI comes
    /// from `unitgraph.yml`, then the `origin` remote, then the directory name.
    pub async fn discover(
        dir: &Path,
        commit: Option<String>,
        config: Arc<UnitgraphConfig>,
        executor: Arc<Executor>,
    ) -> Result<Self, JobError> {
        if !dir.exists() {
            return Err(JobError::PathNotFound(dir.to_path_buf()));
        }
        if !dir.is_dir() {
            return Err(JobError::NotADirectory(dir.to_path_buf()));
        }
        let repo_dir = dir.canonicalize().map_err(|source| JobError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let repo = RepositoryConfig::load(&repo_dir)?;

        let commit_id = match commit {
            Some(c) => c,
            None => git(&repo_dir, &["rev-parse", "HEAD"])
                .await
                .ok_or_else(|| JobError::Commit {
                    path: repo_dir.clone(),
                    message: "not a git checkout; pass a commit explicitly".to_string(),
                })?,
        };

        let repo_uri = match &repo.uri {
            Some(uri) => RepoUri::parse(uri),
            None => match git(&repo_dir, &["remote", "get-url", "origin"]).await {
                Some(remote) => RepoUri::parse(&remote),
                None => RepoUri::parse(
                    repo_dir
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("repository"),
                ),
            },
        };

        info!(repo = %repo_uri, commit = %commit_id, dir = %repo_dir.display(), "job discovered");

        Ok(Self {
            repo_dir,
            commit_id,
            repo_uri,
            repo,
            config,
            executor,
        })
    }

    /// Root of the build store; relative store dirs live inside the repository.
    pub fn store_root(&self) -> PathBuf {
        if self.config.store_dir.is_absolute() {
            self.config.store_dir.clone()
        } else {
            self.repo_dir.join(&self.config.store_dir)
        }
    }
}

async fn git(dir: &Path, args: &[&str]) -> Option<String> {
    let output = match Command::new("git").args(args).current_dir(dir).output().await {
        Ok(output) => output,
        Err(e) => {
            debug!(error = %e, "failed to run git");
            return None;
        }
    };
    if !output.status.success() {
        debug!(args = ?args, status = %output.status, "git exited unsuccessfully");
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}
