//! Declarative description of one containerized command

use std::fmt;
use std::path::{Path, PathBuf};

use super::recipe::BuildRecipe;
use crate::error::TransformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

impl AccessMode {
    fn suffix(self) -> &'static str {
        match self {
            AccessMode::ReadOnly => "ro",
            AccessMode::ReadWrite => "rw",
        }
    }
}

/// A host directory bound into the container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mount {
    /// Relative paths are resolved against the executor's working directory.
    pub host: PathBuf,
    pub container: String,
    pub mode: AccessMode,
}

impl Mount {
    pub fn read_only(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            mode: AccessMode::ReadOnly,
        }
    }

    pub fn read_write(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            mode: AccessMode::ReadWrite,
        }
    }

    pub fn resolve(&self, working_dir: &Path) -> Mount {
        let host = if self.host.is_absolute() {
            self.host.clone()
        } else if self.host == Path::new(".") || self.host.as_os_str().is_empty() {
            working_dir.to_path_buf()
        } else {
            working_dir.join(&self.host)
        };
        Mount {
            host,
            container: self.container.clone(),
            mode: self.mode,
        }
    }

    /// Docker bind specification, `host:container:ro|rw`.
    pub fn to_bind(&self) -> String {
        format!(
            "{}:{}:{}",
            self.host.display(),
            self.container,
            self.mode.suffix()
        )
    }
}

pub type Transform<T> = Box<dyn Fn(&[u8]) -> Result<T, TransformError> + Send + Sync>;

/// One isolated execution: image recipe, mounts, argument vector and the
/// function turning captured stdout into a typed result.
pub struct ContainerCommand<T> {
    pub recipe: BuildRecipe,
    pub mounts: Vec<Mount>,
    pub args: Vec<String>,
    pub workdir: Option<String>,
    pub transform: Transform<T>,
}

impl<T> ContainerCommand<T> {
    pub fn new<F>(recipe: BuildRecipe, args: Vec<String>, transform: F) -> Self
    where
        F: Fn(&[u8]) -> Result<T, TransformError> + Send + Sync + 'static,
    {
        Self {
            recipe,
            mounts: Vec::new(),
            args,
            workdir: None,
            transform: Box::new(transform),
        }
    }

    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn decode(&self, stdout: &[u8]) -> Result<T, TransformError> {
        (self.transform)(stdout)
    }
}

impl<T> fmt::Debug for ContainerCommand<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerCommand")
            .field("recipe", &self.recipe)
            .field("mounts", &self.mounts)
            .field("args", &self.args)
            .field("workdir", &self.workdir)
            .finish_non_exhaustive()
    }
}

/// Transform decoding stdout as a single JSON document.
pub fn json_transform<T>() -> impl Fn(&[u8]) -> Result<T, TransformError> + Send + Sync
where
    T: serde::de::DeserializeOwned,
{
    |bytes: &[u8]| serde_json::from_slice(bytes).map_err(TransformError::from)
}
