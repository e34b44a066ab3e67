use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::{container_dir, package_kind, GoConfig, GoVersion, TOOLCHAIN_NAME};
use crate::error::{ToolchainError, TransformError};
use crate::job::JobContext;
use crate::toolchain::Scanner;
use crate::unit::{SourceUnit, UnitKey, UnitKind};

/// Fields of `go list -json` output used for discovery.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ListedPackage {
    dir: String,
    import_path: String,
    name: String,
    go_files: Vec<String>,
    cgo_files: Vec<String>,
    test_go_files: Vec<String>,
    x_test_go_files: Vec<String>,
    standard: bool,
}

/// Decodes the concatenated JSON objects `go list -json` prints.
fn decode_packages(stdout: &[u8]) -> Result<Vec<ListedPackage>, TransformError> {
    serde_json::Deserializer::from_slice(stdout)
        .into_iter::<ListedPackage>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(TransformError::from)
}

/// Turns listed packages into units relative to `root` (the mount point).
fn to_units(packages: Vec<ListedPackage>, root: &str) -> Vec<SourceUnit> {
    let mut units: BTreeMap<UnitKey, SourceUnit> = BTreeMap::new();
    for pkg in packages {
        if pkg.standard {
            continue;
        }
        let rel = match pkg.dir.strip_prefix(root) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
            _ => {
                warn!(dir = %pkg.dir, import_path = %pkg.import_path, "package outside repository, skipping");
                continue;
            }
        };

        let files = pkg
            .go_files
            .iter()
            .chain(&pkg.cgo_files)
            .chain(&pkg.test_go_files)
            .chain(&pkg.x_test_go_files)
            .map(|f| if rel.is_empty() { f.clone() } else { format!("{}/{}", rel, f) })
            .collect();

        let mut unit = SourceUnit::new(package_kind(), &pkg.import_path, rel).with_files(files);
        unit.data = json!({ "package_name": pkg.name });
        units.entry(unit.key()).or_insert(unit);
    }
    units.into_values().collect()
}

pub struct GoScanner {
    version: GoVersion,
}

impl GoScanner {
    pub fn new(version: GoVersion) -> Self {
        Self { version }
    }
}

#[async_trait]
impl Scanner for GoScanner {
    fn name(&self) -> &str {
        TOOLCHAIN_NAME
    }

    fn unit_kinds(&self) -> Vec<UnitKind> {
        vec![package_kind()]
    }

    async fn scan(&self, job: &JobContext) -> Result<Vec<SourceUnit>, ToolchainError> {
        let config = GoConfig::for_job(job)?;
        let root = container_dir(&config.base_import_path);

        let args = ["go", "list", "-e", "-json", "./..."]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let command = self.version.command(&config.base_import_path, args, decode_packages);

        let packages = job.executor.execute(&command, &job.repo_dir).await?;
        let units = to_units(packages, &root);
        info!(count = units.len(), base = %config.base_import_path, "scanned Go packages");
        Ok(units)
    }
}
