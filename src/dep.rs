//! Raw and resolved dependency records

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::unit::{UnitId, UnitKey, UnitKind};

/// Tag identifying which resolver understands a raw dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetType(String);

impl TargetType {
    pub fn new(target_type: impl Into<String>) -> Self {
        Self(target_type.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An unresolved reference declared by a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDependency {
    pub target_type: TargetType,
    /// Toolchain-specific payload, e.g. an import path string.
    pub target: serde_json::Value,
}

impl RawDependency {
    pub fn new(target_type: TargetType, target: serde_json::Value) -> Self {
        Self {
            target_type,
            target,
        }
    }

    /// Canonical string form of the payload, used as the resolution cache key.
    pub fn payload_key(&self) -> String {
        match &self.target {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// The fully resolved destination of a raw dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub to_repo_clone_url: String,
    pub to_unit_kind: UnitKind,
    pub to_unit_id: UnitId,
    /// Set only when the target belongs to a pinned standard distribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_version_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_rev_spec: Option<String>,
}

impl ResolvedTarget {
    pub fn new(repo: impl Into<String>, kind: UnitKind, id: UnitId) -> Self {
        Self {
            to_repo_clone_url: repo.into(),
            to_unit_kind: kind,
            to_unit_id: id,
            to_version_string: None,
            to_rev_spec: None,
        }
    }

    pub fn pinned(mut self, version: impl Into<String>, rev_spec: impl Into<String>) -> Self {
        self.to_version_string = Some(version.into());
        self.to_rev_spec = Some(rev_spec.into());
        self
    }

    pub fn is_pinned(&self) -> bool {
        self.to_version_string.is_some()
    }
}

/// Raw dependencies of one unit, as persisted by the list stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDeps {
    pub unit: UnitKey,
    pub deps: Vec<RawDependency>,
}

/// Outcome of resolving one raw dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedDep {
    pub raw: RawDependency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ResolvedTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Resolution results of one unit, as persisted by the resolve stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitResolution {
    pub unit: UnitKey,
    pub resolved: Vec<ResolvedDep>,
}

impl UnitResolution {
    pub fn unresolved(&self) -> impl Iterator<Item = &ResolvedDep> {
        self.resolved.iter().filter(|d| d.target.is_none())
    }
}
