//! Error taxonomy for the dependency graph pipeline
//!
//! Errors are split by the stage that produces them so callers can tell a
//! misconfigured toolchain (fatal, aborts compilation) apart from a failed
//! container run or a malformed toolchain output (fails one rule only).

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::dep::TargetType;
use crate::unit::UnitKind;

/// Missing or conflicting toolchain registrations. Always fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("no lister registered for unit kind {0}")]
    NoLister(UnitKind),

    #[error("no resolver registered for target type {0}")]
    NoResolver(TargetType),

    #[error("unit kind {kind} already has lister {existing}, refusing to register {new}")]
    ListerConflict {
        kind: UnitKind,
        existing: String,
        new: String,
    },

    #[error("target type {target_type} already has resolver {existing}, refusing to register {new}")]
    ResolverConflict {
        target_type: TargetType,
        existing: String,
        new: String,
    },

    #[error("scanner {0} is already registered")]
    ScannerConflict(String),

    #[error("invalid configuration for toolchain {toolchain}: {message}")]
    InvalidToolchainConfig { toolchain: String, message: String },
}

/// Decoding failure inside a container command's output transform.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("malformed JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of the containerized execution layer.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The command ran but exited with a non-zero status.
    #[error("command {command:?} exited with status {status}: {}", String::from_utf8_lossy(.output).trim())]
    Execution {
        command: Vec<String>,
        status: i64,
        output: Vec<u8>,
    },

    #[error("command {command:?} timed out after {}s", .timeout.as_secs())]
    Timeout {
        command: Vec<String>,
        timeout: Duration,
    },

    /// The command succeeded but its output could not be decoded.
    #[error("failed to decode output of {command:?}: {source}")]
    Transform {
        command: Vec<String>,
        #[source]
        source: TransformError,
    },

    #[error("failed to build image {tag}: {message}")]
    ImageBuild { tag: String, message: String },

    #[error("container runtime error: {0}")]
    Runtime(String),
}

impl ExecError {
    /// Captured output of a failed command, if any.
    pub fn output(&self) -> Option<&[u8]> {
        match self {
            ExecError::Execution { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecError::Timeout { .. })
    }
}

impl From<bollard::errors::Error> for ExecError {
    fn from(err: bollard::errors::Error) -> Self {
        ExecError::Runtime(err.to_string())
    }
}

/// Errors raised by scanners and listers.
#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("unit {unit} cannot be handled by {toolchain}: {message}")]
    InvalidUnit {
        toolchain: String,
        unit: String,
        message: String,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Failures of an external package index lookup.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("request for {reference} failed: {message}")]
    Network { reference: String, message: String },

    #[error("unknown reference {0}")]
    NotFound(String),

    #[error("index response for {reference} is invalid: {message}")]
    InvalidResponse { reference: String, message: String },

    #[error("package index client setup failed: {0}")]
    Client(String),
}

/// Failures resolving a single raw dependency.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unable to resolve {reference}: {source}")]
    Lookup {
        reference: String,
        #[source]
        source: IndexError,
    },

    #[error("payload {payload} is not valid for target type {target_type}")]
    InvalidPayload {
        target_type: TargetType,
        payload: String,
    },

    #[error("cannot compute unit location for {reference}: {message}")]
    Location { reference: String, message: String },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Build store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize {}: {source}", .path.display())]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid store key component {0:?}")]
    InvalidKey(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Structural problems in a set of build rules.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("output {} is produced by both {first} and {second}", .path.display())]
    DuplicateOutput {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("duplicate rule name {0}")]
    DuplicateRule(String),

    #[error("dependency cycle between rules: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// Failure of a single build rule's action.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("input rule {0} failed")]
    DependencyFailed(String),

    #[error("cancelled before the rule was started")]
    Cancelled,

    #[error("rule action panicked: {0}")]
    Panicked(String),
}

impl From<ExecError> for RuleError {
    fn from(err: ExecError) -> Self {
        RuleError::Toolchain(ToolchainError::Exec(err))
    }
}

/// Errors aborting graph compilation before any unit rule runs.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("scan failed: {0}")]
    Scan(#[source] RuleError),

    #[error("failed to enumerate repository files: {0}")]
    Walk(String),
}

/// Failures building the job context.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("repository path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid repository config {}: {source}", .path.display())]
    InvalidConfig {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("cannot determine commit for {}: {message}", .path.display())]
    Commit { path: PathBuf, message: String },
}

/// One failed rule together with its cause.
#[derive(Debug)]
pub struct RuleFailure {
    pub rule: String,
    pub error: RuleError,
}

impl fmt::Display for RuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.rule, self.error)
    }
}

/// Returned by a full run when at least one rule failed or the run was cancelled.
#[derive(Debug, Error)]
#[error("{} rule(s) failed:\n{}", .failures.len(), format_failures(.failures))]
pub struct AggregateError {
    pub failures: Vec<RuleFailure>,
    pub report: crate::graph::RunReport,
}

fn format_failures(failures: &[RuleFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  {}", f))
        .collect::<Vec<_>>()
        .join("\n")
}
