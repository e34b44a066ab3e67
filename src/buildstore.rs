//! Per-commit artifact store
//!
//! Layout under the store root:
//!
//! ```text
//! <repo uri>/<commit>/units.json
//! <repo uri>/<commit>/deps/<kind>/<unit id>.json
//! <repo uri>/<commit>/resolved/<kind>/<unit id>.json
//! ```
//!
//! The root unit (empty id) is stored as `_root.json`. Every write goes to a
//! uniquely named sibling first and is renamed into place, so readers never
//! observe a partially written artifact.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;
use uuid::Uuid;

use crate::dep::{UnitDeps, UnitResolution};
use crate::error::StoreError;
use crate::job::RepoUri;
use crate::unit::{SourceUnit, UnitKey};

const UNITS_FILE: &str = "units.json";
const ROOT_UNIT_FILE: &str = "_root";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Deps,
    Resolved,
}

impl Stage {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Stage::Deps => "deps",
            Stage::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildStore {
    root: PathBuf,
}

fn check_component(component: &str) -> Result<&str, StoreError> {
    if component.is_empty()
        || component == "."
        || component == ".."
        || component.contains(['/', '\\', '\0'])
    {
        return Err(StoreError::InvalidKey(component.to_string()));
    }
    Ok(component)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl BuildStore {
    /// Opens (creating if needed) the directory of one commit.
    pub fn open(store_root: &Path, repo: &RepoUri, commit: &str) -> Result<Self, StoreError> {
        let mut root = store_root.to_path_buf();
        for part in repo.as_str().split('/') {
            root.push(check_component(part)?);
        }
        root.push(check_component(commit)?);

        fs::create_dir_all(&root).map_err(io_error(&root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn units_path(&self) -> PathBuf {
        self.root.join(UNITS_FILE)
    }

    pub fn artifact_path(&self, stage: Stage, key: &UnitKey) -> Result<PathBuf, StoreError> {
        let mut path = self.root.join(stage.dir_name());
        path.push(check_component(key.kind.as_str())?);

        if key.id.is_root() {
            path.push(format!("{}.json", ROOT_UNIT_FILE));
            return Ok(path);
        }

        let segments: Vec<&str> = key.id.as_str().split('/').collect();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| StoreError::InvalidKey(key.id.to_string()))?;
        for segment in parents {
            path.push(check_component(segment)?);
        }
        path.push(format!("{}.json", check_component(last)?));
        Ok(path)
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Serializes `value` as pretty JSON and atomically replaces `path`.
    pub fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serde {
            path: path.to_path_buf(),
            source,
        })?;

        let parent = path
            .parent()
            .ok_or_else(|| StoreError::InvalidKey(path.display().to_string()))?;
        fs::create_dir_all(parent).map_err(io_error(parent))?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::InvalidKey(path.display().to_string()))?;
        let tmp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        fs::write(&tmp, &bytes).map_err(io_error(&tmp))?;
        if let Err(source) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
        trace!(path = %path.display(), bytes = bytes.len(), "wrote artifact");
        Ok(())
    }

    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T, StoreError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path.to_path_buf()))
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Serde {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Deletes an artifact; a missing file is not an error.
    pub fn remove(&self, path: &Path) -> Result<(), StoreError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn write_units(&self, units: &[SourceUnit]) -> Result<(), StoreError> {
        self.write_json(&self.units_path(), units)
    }

    pub fn read_units(&self) -> Result<Vec<SourceUnit>, StoreError> {
        self.read_json(&self.units_path())
    }

    pub fn write_deps(&self, deps: &UnitDeps) -> Result<(), StoreError> {
        self.write_json(&self.artifact_path(Stage::Deps, &deps.unit)?, deps)
    }

    pub fn read_deps(&self, key: &UnitKey) -> Result<UnitDeps, StoreError> {
        self.read_json(&self.artifact_path(Stage::Deps, key)?)
    }

    pub fn write_resolution(&self, resolution: &UnitResolution) -> Result<(), StoreError> {
        self.write_json(&self.artifact_path(Stage::Resolved, &resolution.unit)?, resolution)
    }

    pub fn read_resolution(&self, key: &UnitKey) -> Result<UnitResolution, StoreError> {
        self.read_json(&self.artifact_path(Stage::Resolved, key)?)
    }
}
