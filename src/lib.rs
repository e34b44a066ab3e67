//! unitgraph - containerized cross-repository dependency graph builder
//!
//! A repository is split into source units by toolchain scanners. Each unit's
//! raw dependencies are listed inside a toolchain container and resolved to
//! units of other repositories, possibly through an external package index.
//! The work is expressed as a graph of file-producing build rules that runs
//! incrementally and keeps going when individual units fail.
//!
//! # Example Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use unitgraph::{
//!     DockerRuntime, Executor, GraphCompiler, JobContext, Maker, ToolchainRegistry,
//!     UnitgraphConfig,
//! };
//!
//! async fn build(dir: &std::path::Path) -> anyhow::Result<()> {
//!     let config = Arc::new(UnitgraphConfig::default());
//!     let registry = Arc::new(ToolchainRegistry::with_defaults(&config)?);
//!     let executor = Arc::new(Executor::new(
//!         Arc::new(DockerRuntime::connect()?),
//!         config.command_timeout(),
//!     ));
//!     let job = Arc::new(JobContext::discover(dir, None, config.clone(), executor).await?);
//!
//!     let graph = GraphCompiler::new(registry).compile(job).await?;
//!     let report = Maker::new(config.concurrency).run(&graph).await?;
//!     println!("{} rules executed", report.executed.len());
//!     Ok(())
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`toolchain`]: scanner, lister and resolver traits, the registry and the Go toolchain
//! - [`container`]: containerized command execution
//! - [`resolve`]: resolution cache and package index abstraction
//! - [`graph`]: build rules, graph compilation and the incremental maker
//! - [`buildstore`]: per-commit artifact storage

pub mod buildstore;
pub mod cli;
pub mod config;
pub mod container;
pub mod dep;
pub mod error;
pub mod graph;
pub mod job;
pub mod progress;
pub mod resolve;
pub mod toolchain;
pub mod unit;
pub mod util;

pub use buildstore::{BuildStore, Stage};
pub use config::{ConfigError, UnitgraphConfig};
pub use container::{ContainerCommand, ContainerRuntime, DockerRuntime, Executor};
pub use dep::{RawDependency, ResolvedDep, ResolvedTarget, TargetType, UnitDeps, UnitResolution};
pub use error::{
    AggregateError, CompileError, ConfigurationError, ExecError, ResolveError, RuleError,
};
pub use graph::{BuildGraph, BuildRule, CancelHandle, GraphCompiler, Maker, RunReport};
pub use job::{JobContext, RepoUri, RepositoryConfig};
pub use resolve::{PackageIndex, ResolveCache};
pub use toolchain::{Lister, Resolver, Scanner, ToolchainRegistry};
pub use unit::{SourceUnit, UnitId, UnitKey, UnitKind};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
