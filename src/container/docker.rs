//! Docker engine runtime built on bollard

use async_trait::async_trait;
use bollard::container::{
    Config, KillContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::BuildImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::recipe::BuildRecipe;
use super::runtime::{ContainerRuntime, RunOutput, RunRequest};
use crate::error::ExecError;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self, ExecError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    async fn wait_for_exit(&self, id: &str) -> Result<i64, ExecError> {
        let mut stream = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>);

        let mut status = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(response) => status = Some(response.status_code),
                // bollard reports non-zero exits through this error variant
                Err(bollard::errors::Error::DockerContainerWaitError { code, .. }) => {
                    status = Some(code)
                }
                Err(e) => return Err(e.into()),
            }
        }

        status.ok_or_else(|| ExecError::Runtime(format!("no exit status for container {}", id)))
    }

    async fn collect_logs(&self, id: &str) -> Result<(Vec<u8>, Vec<u8>), ExecError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        };

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut stream = self.docker.logs(id, Some(options));
        while let Some(chunk) = stream.next().await {
            match chunk? {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    stdout.extend_from_slice(&message)
                }
                LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                LogOutput::StdIn { .. } => {}
            }
        }
        Ok((stdout, stderr))
    }

    async fn remove(&self, id: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_container(id, Some(options)).await {
            warn!(container = %id, error = %e, "failed to remove container");
        }
    }

    async fn run_created(&self, id: &str, request: &RunRequest) -> Result<RunOutput, ExecError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;

        let exit_code = match timeout(request.timeout, self.wait_for_exit(id)).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(container = %id, args = ?request.args, "command timed out, killing container");
                if let Err(e) = self
                    .docker
                    .kill_container(id, None::<KillContainerOptions<String>>)
                    .await
                {
                    debug!(container = %id, error = %e, "kill after timeout failed");
                }
                return Err(ExecError::Timeout {
                    command: request.args.clone(),
                    timeout: request.timeout,
                });
            }
        };

        let (stdout, stderr) = self.collect_logs(id).await?;
        Ok(RunOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}

fn build_context(dockerfile: &str) -> std::io::Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_path("Dockerfile")?;
    header.set_size(dockerfile.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append(&header, dockerfile.as_bytes())?;
    builder.into_inner()
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ensure_image(&self, recipe: &BuildRecipe, tag: &str) -> Result<(), ExecError> {
        if self.docker.inspect_image(tag).await.is_ok() {
            debug!(image = %tag, "reusing existing toolchain image");
            return Ok(());
        }

        info!(image = %tag, base = %recipe.base_image, "building toolchain image");
        let context = build_context(&recipe.to_dockerfile()).map_err(|e| ExecError::ImageBuild {
            tag: tag.to_string(),
            message: e.to_string(),
        })?;

        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: tag.to_string(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let mut stream = self
            .docker
            .build_image(options, None, Some(Bytes::from(context)));
        while let Some(item) = stream.next().await {
            let info = item.map_err(|e| ExecError::ImageBuild {
                tag: tag.to_string(),
                message: e.to_string(),
            })?;
            if let Some(error) = info.error {
                return Err(ExecError::ImageBuild {
                    tag: tag.to_string(),
                    message: error,
                });
            }
            if let Some(line) = info.stream {
                debug!(image = %tag, "{}", line.trim_end());
            }
        }

        Ok(())
    }

    async fn run(&self, request: &RunRequest) -> Result<RunOutput, ExecError> {
        let binds: Vec<String> = request.mounts.iter().map(|m| m.to_bind()).collect();

        let config = Config {
            image: Some(request.image.clone()),
            cmd: Some(request.args.clone()),
            working_dir: request.workdir.clone(),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            host_config: Some(HostConfig {
                binds: Some(binds),
                ..Default::default()
            }),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container::<String, String>(None, config)
            .await?;
        debug!(container = %container.id, args = ?request.args, "created container");

        let result = self.run_created(&container.id, request).await;
        self.remove(&container.id).await;
        result
    }
}
