//! Test doubles shared by the integration tests
//!
//! `ScriptedRuntime` answers container runs from a closure instead of a real
//! engine and records every request. `StubIndex` serves package index entries
//! from a fixed table and counts lookups.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use unitgraph::container::{BuildRecipe, ContainerRuntime, Executor, RunOutput, RunRequest};
use unitgraph::error::{ExecError, IndexError};
use unitgraph::job::{JobContext, RepoUri, RepositoryConfig};
use unitgraph::resolve::{IndexEntry, PackageIndex};
use unitgraph::UnitgraphConfig;

type Script = dyn Fn(&RunRequest) -> RunOutput + Send + Sync;

pub struct ScriptedRuntime {
    script: Box<Script>,
    runs: Mutex<Vec<RunRequest>>,
    images: AtomicUsize,
}

impl ScriptedRuntime {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&RunRequest) -> RunOutput + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            runs: Mutex::new(Vec::new()),
            images: AtomicUsize::new(0),
        }
    }

    /// A runtime that fails every run; for tests that never reach a container.
    pub fn unused() -> Self {
        Self::new(|_| RunOutput::failure(125, "no container expected"))
    }

    pub fn runs(&self) -> Vec<RunRequest> {
        self.runs.lock().unwrap().clone()
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    pub fn images_prepared(&self) -> usize {
        self.images.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn ensure_image(&self, _recipe: &BuildRecipe, _tag: &str) -> Result<(), ExecError> {
        self.images.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn run(&self, request: &RunRequest) -> Result<RunOutput, ExecError> {
        self.runs.lock().unwrap().push(request.clone());
        Ok((self.script)(request))
    }
}

pub struct StubIndex {
    entries: HashMap<String, IndexEntry>,
    lookups: Mutex<Vec<String>>,
}

impl StubIndex {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn with_entry(mut self, reference: &str, repo_url: &str, root_path: &str, standard: bool) -> Self {
        self.entries.insert(
            reference.to_string(),
            IndexEntry {
                repo_url: repo_url.to_string(),
                root_path: root_path.to_string(),
                import_path: reference.to_string(),
                standard_distribution: standard,
            },
        );
        self
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl PackageIndex for StubIndex {
    async fn lookup(&self, reference: &str) -> Result<IndexEntry, IndexError> {
        self.lookups.lock().unwrap().push(reference.to_string());
        // Give concurrent callers a chance to overlap.
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.entries
            .get(reference)
            .cloned()
            .ok_or_else(|| IndexError::NotFound(reference.to_string()))
    }
}

pub fn repo_config(yaml: &str) -> RepositoryConfig {
    serde_yaml::from_str(yaml).unwrap()
}

/// A job over `repo_dir` with its build store under `store_dir`.
pub fn job(
    repo_dir: &Path,
    store_dir: &Path,
    uri: &str,
    repo: RepositoryConfig,
    runtime: Arc<ScriptedRuntime>,
) -> JobContext {
    let config = UnitgraphConfig {
        store_dir: store_dir.to_path_buf(),
        ..UnitgraphConfig::default()
    };
    let executor = Executor::new(runtime, Duration::from_secs(30));
    JobContext::new(
        repo_dir,
        "0123abcd",
        RepoUri::parse(uri),
        repo,
        Arc::new(config),
        Arc::new(executor),
    )
}
