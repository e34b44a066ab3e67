//! Process-wide configuration read from the environment

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;
const DEFAULT_LOOKUP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STORE_DIR: &str = ".unitgraph-data";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_GO_VERSION: &str = "1.22.5";
const MAX_CONCURRENCY: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

#[derive(Debug, Clone)]
pub struct UnitgraphConfig {
    /// Upper bound on build rules running at the same time
    pub concurrency: usize,
    pub command_timeout_secs: u64,
    /// Timeout for a single package index request
    pub lookup_timeout_secs: u64,
    /// Build store root, relative to the repository unless absolute
    pub store_dir: PathBuf,
    pub log_level: String,
    /// Go toolchain version used for images and for pinning standard library targets
    pub go_version: String,
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for UnitgraphConfig {
    fn default() -> Self {
        let concurrency = env::var("UNITGRAPH_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or_else(default_concurrency);

        let command_timeout_secs = env::var("UNITGRAPH_COMMAND_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS);

        let lookup_timeout_secs = env::var("UNITGRAPH_LOOKUP_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_LOOKUP_TIMEOUT_SECS);

        let store_dir = env::var("UNITGRAPH_STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORE_DIR));

        let log_level = env::var("UNITGRAPH_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        let go_version =
            env::var("UNITGRAPH_GO_VERSION").unwrap_or_else(|_| DEFAULT_GO_VERSION.to_string());

        Self {
            concurrency,
            command_timeout_secs,
            lookup_timeout_secs,
            store_dir,
            log_level,
            go_version,
        }
    }
}

impl UnitgraphConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "Concurrency must be at least 1".to_string(),
            ));
        }
        if self.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::ValidationFailed(format!(
                "Concurrency cannot exceed {}",
                MAX_CONCURRENCY
            )));
        }

        if self.command_timeout_secs == 0 || self.command_timeout_secs > 86_400 {
            return Err(ConfigError::ValidationFailed(
                "Command timeout must be between 1 second and 24 hours".to_string(),
            ));
        }

        if self.lookup_timeout_secs == 0 || self.lookup_timeout_secs > 3600 {
            return Err(ConfigError::ValidationFailed(
                "Lookup timeout must be between 1 second and 1 hour".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        if self.go_version.trim().is_empty() {
            return Err(ConfigError::ParseError {
                field: "UNITGRAPH_GO_VERSION".to_string(),
                error: "must not be empty".to_string(),
            });
        }

        if self.store_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Store directory must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }
}

impl fmt::Display for UnitgraphConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Unitgraph Configuration:")?;
        writeln!(f, "  Concurrency: {}", self.concurrency)?;
        writeln!(f, "  Command Timeout: {}s", self.command_timeout_secs)?;
        writeln!(f, "  Lookup Timeout: {}s", self.lookup_timeout_secs)?;
        writeln!(f, "  Store Dir: {}", self.store_dir.display())?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        writeln!(f, "  Go Version: {}", self.go_version)?;
        Ok(())
    }
}
