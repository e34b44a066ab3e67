//! Runtime boundary between the executor and a concrete container engine

use async_trait::async_trait;
use std::time::Duration;

use super::command::Mount;
use super::recipe::BuildRecipe;
use crate::error::ExecError;

/// A fully resolved run: image already built, mounts absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub image: String,
    pub args: Vec<String>,
    pub mounts: Vec<Mount>,
    pub workdir: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub exit_code: i64,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl RunOutput {
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    pub fn failure(exit_code: i64, stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// Stdout followed by stderr.
    pub fn combined(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.stdout.len() + self.stderr.len());
        out.extend_from_slice(&self.stdout);
        out.extend_from_slice(&self.stderr);
        out
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Makes sure an image for `recipe` exists under `tag`.
    async fn ensure_image(&self, recipe: &BuildRecipe, tag: &str) -> Result<(), ExecError>;

    /// Runs to completion in a fresh container and removes it afterwards.
    ///
    /// A run exceeding `request.timeout` is killed and reported as
    /// `ExecError::Timeout`. A non-zero exit is not an error at this layer.
    async fn run(&self, request: &RunRequest) -> Result<RunOutput, ExecError>;
}
