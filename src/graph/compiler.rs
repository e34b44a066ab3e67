//! Expands a job into build rules
//!
//! The pipeline is fixed: one `scan` rule writes `units.json`, then every
//! unit gets a `list` rule (raw dependencies) and a `resolve` rule (resolved
//! targets). The scan runs during compilation because the unit set decides
//! which list and resolve rules exist; it stays in the returned graph so a
//! later run sees it as up to date.

use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::maker::Maker;
use super::rule::{Action, ActionOutput, BuildGraph, BuildRule};
use crate::buildstore::{BuildStore, Stage};
use crate::dep::{ResolvedDep, UnitDeps, UnitResolution};
use crate::error::{CompileError, ResolveError, RuleError};
use crate::job::{JobContext, REPO_CONFIG_FILE};
use crate::progress::{NoOpHandler, ProgressHandler};
use crate::toolchain::{Lister, ToolchainRegistry};
use crate::unit::{SourceUnit, UnitKey};

pub const SCAN_RULE: &str = "scan";

pub fn list_rule_name(key: &UnitKey) -> String {
    format!("list:{}", key)
}

pub fn resolve_rule_name(key: &UnitKey) -> String {
    format!("resolve:{}", key)
}

pub struct GraphCompiler {
    registry: Arc<ToolchainRegistry>,
    progress: Arc<dyn ProgressHandler>,
}

impl GraphCompiler {
    pub fn new(registry: Arc<ToolchainRegistry>) -> Self {
        Self {
            registry,
            progress: Arc::new(NoOpHandler),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    /// Runs only the scan and returns the units it recorded.
    pub async fn scan(&self, job: Arc<JobContext>) -> Result<Vec<SourceUnit>, CompileError> {
        let (store, _) = self.run_scan(&job).await?;
        Ok(store.read_units()?)
    }

    /// Runs the scan if it is stale and returns the full rule graph.
    pub async fn compile(&self, job: Arc<JobContext>) -> Result<BuildGraph, CompileError> {
        let (store, scan) = self.run_scan(&job).await?;

        let units = store.read_units()?;
        let mut rules = Vec::with_capacity(1 + units.len() * 2);
        rules.push(scan);

        for unit in units {
            let lister = self.registry.lister(&unit.kind)?;
            let key = unit.key();
            let deps_path = store.artifact_path(Stage::Deps, &key)?;
            let resolved_path = store.artifact_path(Stage::Resolved, &key)?;

            let mut list_inputs: Vec<PathBuf> =
                unit.files.iter().map(|f| job.repo_dir.join(f)).collect();
            list_inputs.push(store.units_path());

            rules.push(BuildRule::new(
                list_rule_name(&key),
                list_inputs,
                vec![deps_path.clone()],
                Arc::new(ListAction {
                    lister,
                    unit,
                    job: job.clone(),
                    store: store.clone(),
                }),
            ));
            rules.push(BuildRule::new(
                resolve_rule_name(&key),
                vec![deps_path],
                vec![resolved_path],
                Arc::new(ResolveAction {
                    registry: self.registry.clone(),
                    key,
                    job: job.clone(),
                    store: store.clone(),
                }),
            ));
        }

        let graph = BuildGraph::new(rules)?;
        info!(rules = graph.len(), store = %store.root().display(), "compiled build graph");
        Ok(graph)
    }

    async fn run_scan(&self, job: &Arc<JobContext>) -> Result<(BuildStore, BuildRule), CompileError> {
        self.registry.check()?;

        let store = BuildStore::open(&job.store_root(), &job.repo_uri, &job.commit_id)?;
        let scan = self.scan_rule(job, &store)?;

        let scan_graph = BuildGraph::new(vec![scan.clone()])?;
        Maker::new(1)
            .with_progress(self.progress.clone())
            .run(&scan_graph)
            .await
            .map_err(|mut err| match err.failures.pop() {
                Some(failure) => CompileError::Scan(failure.error),
                None => CompileError::Scan(RuleError::Cancelled),
            })?;
        Ok((store, scan))
    }

    fn scan_rule(&self, job: &Arc<JobContext>, store: &BuildStore) -> Result<BuildRule, CompileError> {
        let store_root = job.store_root();
        let mut inputs = Vec::new();
        let walker = ignore::WalkBuilder::new(&job.repo_dir)
            .filter_entry(move |entry| !entry.path().starts_with(&store_root))
            .build();
        for entry in walker {
            let entry = entry.map_err(|e| CompileError::Walk(e.to_string()))?;
            // Directories count too: removing a package only touches its parent's mtime.
            if entry
                .file_type()
                .map(|t| t.is_file() || t.is_dir())
                .unwrap_or(false)
            {
                inputs.push(entry.into_path());
            }
        }
        let repo_config = job.repo_dir.join(REPO_CONFIG_FILE);
        if repo_config.is_file() && !inputs.contains(&repo_config) {
            inputs.push(repo_config);
        }
        inputs.sort();
        debug!(files = inputs.len(), "scan inputs collected");

        Ok(BuildRule::new(
            SCAN_RULE,
            inputs,
            vec![store.units_path()],
            Arc::new(ScanAction {
                registry: self.registry.clone(),
                job: job.clone(),
                store: store.clone(),
            }),
        ))
    }
}

struct ScanAction {
    registry: Arc<ToolchainRegistry>,
    job: Arc<JobContext>,
    store: BuildStore,
}

#[async_trait]
impl Action for ScanAction {
    async fn run(&self) -> Result<ActionOutput, RuleError> {
        let mut units: BTreeMap<UnitKey, SourceUnit> = BTreeMap::new();
        for scanner in self.registry.scanners() {
            for unit in scanner.scan(&self.job).await? {
                let key = unit.key();
                if units.contains_key(&key) {
                    debug!(unit = %key, scanner = scanner.name(), "duplicate unit ignored");
                    continue;
                }
                units.insert(key, unit);
            }
        }

        let units: Vec<SourceUnit> = units.into_values().collect();
        info!(units = units.len(), "repository scanned");
        self.store.write_units(&units)?;
        Ok(ActionOutput::default())
    }
}

struct ListAction {
    lister: Arc<dyn Lister>,
    unit: SourceUnit,
    job: Arc<JobContext>,
    store: BuildStore,
}

#[async_trait]
impl Action for ListAction {
    async fn run(&self) -> Result<ActionOutput, RuleError> {
        let deps = self.lister.list(&self.unit, &self.job).await?;
        debug!(unit = %self.unit.key(), deps = deps.len(), "listed dependencies");
        self.store.write_deps(&UnitDeps {
            unit: self.unit.key(),
            deps,
        })?;
        Ok(ActionOutput::default())
    }
}

struct ResolveAction {
    registry: Arc<ToolchainRegistry>,
    key: UnitKey,
    job: Arc<JobContext>,
    store: BuildStore,
}

#[async_trait]
impl Action for ResolveAction {
    async fn run(&self) -> Result<ActionOutput, RuleError> {
        let UnitDeps { deps, .. } = self.store.read_deps(&self.key)?;

        // An unknown target type is a configuration problem and fails the rule.
        let resolvers = deps
            .iter()
            .map(|dep| self.registry.resolver(&dep.target_type))
            .collect::<Result<Vec<_>, _>>()?;

        let results = join_all(
            deps.iter()
                .zip(&resolvers)
                .map(|(dep, resolver)| resolver.resolve(dep, &self.job)),
        )
        .await;

        let mut unresolved = 0;
        let mut resolved = Vec::with_capacity(deps.len());
        for (raw, result) in deps.into_iter().zip(results) {
            match result {
                Ok(target) => resolved.push(ResolvedDep {
                    raw,
                    target: Some(target),
                    error: None,
                }),
                Err(ResolveError::Configuration(e)) => return Err(e.into()),
                Err(e) => {
                    warn!(unit = %self.key, dependency = %raw.payload_key(), error = %e, "dependency unresolved");
                    unresolved += 1;
                    resolved.push(ResolvedDep {
                        raw,
                        target: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        self.store.write_resolution(&UnitResolution {
            unit: self.key.clone(),
            resolved,
        })?;
        Ok(ActionOutput { unresolved })
    }
}
