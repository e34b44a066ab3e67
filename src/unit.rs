//! Source units: the nodes of the dependency graph
//!
//! A unit is one importable module (a Go package, for example). Its identity
//! is `(kind, id)` where the id is derived only from the unit's
//! repository-relative directory, so scanners, listers, resolvers and
//! downstream consumers all compute the same join key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

/// Tag selecting the toolchain responsible for a unit (e.g. `GoPackage`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitKind(String);

impl UnitKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Repository-relative unit identifier. The repository root is the empty id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    /// Normalizes a relative directory into an id.
    ///
    /// `./a/b/`, `a//b` and `a\b` all map to `a/b`; `.` and `` map to the empty id.
    /// `..` components are kept so ids of paths outside the root stay distinct.
    pub fn from_dir(dir: impl AsRef<str>) -> Self {
        let dir = dir.as_ref().replace('\\', "/");
        let parts: Vec<&str> = dir
            .split('/')
            .filter(|part| !part.is_empty() && *part != ".")
            .collect();
        Self(parts.join("/"))
    }

    /// Id for a filesystem path relative to the repository root.
    pub fn from_path(path: &Path) -> Self {
        let parts: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(p) => Some(p.to_string_lossy().into_owned()),
                Component::ParentDir => Some("..".to_string()),
                _ => None,
            })
            .collect();
        Self(parts.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str(".")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// The graph's join key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitKey {
    pub kind: UnitKind,
    pub id: UnitId,
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A typed collection of source files forming one importable module.
///
/// `name` is the toolchain's own name for the unit (an import path for Go)
/// and `data` carries any further toolchain-specific fields. Neither takes
/// part in the unit's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceUnit {
    pub kind: UnitKind,
    pub name: String,
    pub dir: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl SourceUnit {
    pub fn new(kind: UnitKind, name: impl Into<String>, dir: impl AsRef<str>) -> Self {
        let id = UnitId::from_dir(dir);
        Self {
            kind,
            name: name.into(),
            dir: id.0,
            files: Vec::new(),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    pub fn id(&self) -> UnitId {
        UnitId::from_dir(&self.dir)
    }

    pub fn key(&self) -> UnitKey {
        UnitKey {
            kind: self.kind.clone(),
            id: self.id(),
        }
    }
}
