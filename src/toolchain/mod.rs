//! Toolchain plugin contracts
//!
//! A toolchain contributes three things: a [`Scanner`] that discovers source
//! units, a [`Lister`] per unit kind that enumerates raw dependencies, and a
//! [`Resolver`] per target type that turns a raw dependency into a
//! [`ResolvedTarget`]. Plugins register them into a [`ToolchainRegistry`]
//! before any graph is compiled.

pub mod golang;
pub mod registry;

use async_trait::async_trait;

use crate::container::ContainerCommand;
use crate::dep::{RawDependency, ResolvedTarget, TargetType};
use crate::error::{ResolveError, ToolchainError};
use crate::job::JobContext;
use crate::unit::{SourceUnit, UnitKind};

pub use registry::ToolchainRegistry;

/// Discovers the source units of one toolchain in a repository.
#[async_trait]
pub trait Scanner: Send + Sync {
    fn name(&self) -> &str;

    /// Every kind this scanner can emit; each needs a registered lister.
    fn unit_kinds(&self) -> Vec<UnitKind>;

    async fn scan(&self, job: &JobContext) -> Result<Vec<SourceUnit>, ToolchainError>;
}

#[async_trait]
pub trait Lister: Send + Sync {
    fn name(&self) -> &str;

    /// Target types of the dependencies this lister emits.
    fn target_types(&self) -> Vec<TargetType>;

    async fn list(
        &self,
        unit: &SourceUnit,
        job: &JobContext,
    ) -> Result<Vec<RawDependency>, ToolchainError>;
}

#[async_trait]
pub trait Resolver: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve(
        &self,
        raw: &RawDependency,
        job: &JobContext,
    ) -> Result<ResolvedTarget, ResolveError>;
}

/// A lister expressed purely as a container command.
///
/// Wrap it in [`ContainerLister`] to register it; the adapter runs the
/// command through the job's executor so listing never touches project
/// files on the host.
pub trait CommandLister: Send + Sync {
    fn name(&self) -> &str;

    fn target_types(&self) -> Vec<TargetType>;

    fn command(
        &self,
        unit: &SourceUnit,
        job: &JobContext,
    ) -> Result<ContainerCommand<Vec<RawDependency>>, ToolchainError>;
}

pub struct ContainerLister<C> {
    inner: C,
}

impl<C: CommandLister> ContainerLister<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<C: CommandLister> Lister for ContainerLister<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn target_types(&self) -> Vec<TargetType> {
        self.inner.target_types()
    }

    async fn list(
        &self,
        unit: &SourceUnit,
        job: &JobContext,
    ) -> Result<Vec<RawDependency>, ToolchainError> {
        let command = self.inner.command(unit, job)?;
        tracing::debug!(lister = self.inner.name(), unit = %unit.key(), "listing dependencies");
        Ok(job.executor.execute(&command, &job.repo_dir).await?)
    }
}
