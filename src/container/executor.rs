//! Runs container commands and turns their output into typed results

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::command::ContainerCommand;
use super::runtime::{ContainerRuntime, RunRequest};
use crate::error::ExecError;
use crate::util::OnceMap;

pub struct Executor {
    runtime: Arc<dyn ContainerRuntime>,
    timeout: Duration,
    /// Recipe digest -> image tag, for images built or verified during this process
    images: OnceMap<String, String>,
}

impl Executor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, timeout: Duration) -> Self {
        Self {
            runtime,
            timeout,
            images: OnceMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `command` with relative mounts resolved against `working_dir`.
    ///
    /// A non-zero exit becomes `ExecError::Execution` carrying the captured
    /// output; a decode failure on success becomes `ExecError::Transform`.
    pub async fn execute<T>(
        &self,
        command: &ContainerCommand<T>,
        working_dir: &Path,
    ) -> Result<T, ExecError> {
        let image = self.image_for(command).await?;

        let request = RunRequest {
            image,
            args: command.args.clone(),
            mounts: command
                .mounts
                .iter()
                .map(|m| m.resolve(working_dir))
                .collect(),
            workdir: command.workdir.clone(),
            timeout: self.timeout,
        };

        let started = Instant::now();
        let output = self.runtime.run(&request).await?;
        debug!(
            args = ?request.args,
            exit_code = output.exit_code,
            stdout_bytes = output.stdout.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "container command finished"
        );

        if output.exit_code != 0 {
            warn!(args = ?request.args, exit_code = output.exit_code, "container command failed");
            return Err(ExecError::Execution {
                command: request.args,
                status: output.exit_code,
                output: output.combined(),
            });
        }

        command.decode(&output.stdout).map_err(|source| ExecError::Transform {
            command: request.args,
            source,
        })
    }

    async fn image_for<T>(&self, command: &ContainerCommand<T>) -> Result<String, ExecError> {
        let recipe = &command.recipe;
        self.images
            .get_or_try_init(recipe.digest(), || async {
                let tag = recipe.image_tag();
                self.runtime.ensure_image(recipe, &tag).await?;
                Ok(tag)
            })
            .await
    }
}
