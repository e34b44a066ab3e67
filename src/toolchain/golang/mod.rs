//! Go toolchain
//!
//! Packages are discovered and listed with `go list` inside a `golang` image,
//! with the repository mounted read-only at `$GOPATH/src/<base import path>`.
//! Import paths resolve either inside the repository (by namespace) or through
//! the `go-import` package index.

pub mod index;
pub mod lister;
pub mod resolver;
pub mod scanner;

use serde::Deserialize;
use std::sync::Arc;

use super::{ContainerLister, ToolchainRegistry};
use crate::config::UnitgraphConfig;
use crate::container::{BuildRecipe, ContainerCommand, Mount};
use crate::dep::TargetType;
use crate::error::{ConfigurationError, TransformError};
use crate::job::JobContext;
use crate::resolve::PackageIndex;
use crate::unit::UnitKind;

pub use index::GoImportIndex;
pub use lister::GoLister;
pub use resolver::GoResolver;
pub use scanner::GoScanner;

/// Key of the Go section in `unitgraph.yml`.
pub const TOOLCHAIN_NAME: &str = "go";
pub const PACKAGE_KIND: &str = "GoPackage";
pub const IMPORT_PATH_TARGET: &str = "go-import-path";

const CONTAINER_GOPATH: &str = "/go";

pub fn package_kind() -> UnitKind {
    UnitKind::new(PACKAGE_KIND)
}

pub fn import_path_target() -> TargetType {
    TargetType::new(IMPORT_PATH_TARGET)
}

/// Go settings from `unitgraph.yml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GoConfig {
    /// Import path of the repository root; defaults to the repository URI.
    pub base_import_path: String,
    /// Also list imports of `_test.go` files.
    pub include_test_imports: bool,
}

impl GoConfig {
    pub fn for_job(job: &JobContext) -> Result<Self, ConfigurationError> {
        let mut config: GoConfig = job.repo.toolchain(TOOLCHAIN_NAME)?;
        config.base_import_path = config.base_import_path.trim_matches('/').to_string();
        if config.base_import_path.is_empty() {
            config.base_import_path = job.repo_uri.as_str().to_string();
        }
        Ok(config)
    }
}

/// The Go release in effect; fixes the image and pins standard library targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoVersion {
    pub version: String,
}

impl GoVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    pub fn rev_spec(&self) -> String {
        format!("go{}", self.version)
    }

    pub fn recipe(&self) -> BuildRecipe {
        BuildRecipe::new(format!("golang:{}", self.version))
            .env("GOPATH", CONTAINER_GOPATH)
            .env("GO111MODULE", "auto")
            .env("GOTOOLCHAIN", "local")
    }

    /// `go` invocation with the repository mounted under its import path.
    pub fn command<T, F>(&self, base_import_path: &str, args: Vec<String>, transform: F) -> ContainerCommand<T>
    where
        F: Fn(&[u8]) -> Result<T, TransformError> + Send + Sync + 'static,
    {
        let dir = container_dir(base_import_path);
        ContainerCommand::new(self.recipe(), args, transform)
            .with_mount(Mount::read_only(".", dir.clone()))
            .with_workdir(dir)
    }
}

pub fn container_dir(base_import_path: &str) -> String {
    format!("{}/src/{}", CONTAINER_GOPATH, base_import_path)
}

pub struct GoToolchain {
    pub version: GoVersion,
    pub index: Arc<dyn PackageIndex>,
}

impl GoToolchain {
    pub fn new(version: GoVersion, index: Arc<dyn PackageIndex>) -> Self {
        Self { version, index }
    }

    pub fn from_config(config: &UnitgraphConfig) -> Result<Self, ConfigurationError> {
        let index = GoImportIndex::new(config.lookup_timeout()).map_err(|e| {
            ConfigurationError::InvalidToolchainConfig {
                toolchain: TOOLCHAIN_NAME.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Self::new(GoVersion::new(&config.go_version), Arc::new(index)))
    }
}

pub fn register(registry: &mut ToolchainRegistry, toolchain: GoToolchain) -> Result<(), ConfigurationError> {
    let GoToolchain { version, index } = toolchain;
    registry.register_scanner(Arc::new(GoScanner::new(version.clone())))?;
    registry.register_lister(
        package_kind(),
        Arc::new(ContainerLister::new(GoLister::new(version.clone()))),
    )?;
    registry.register_resolver(import_path_target(), Arc::new(GoResolver::new(version, index)))?;
    Ok(())
}
