use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{import_path_target, package_kind, GoConfig, GoVersion, TOOLCHAIN_NAME};
use crate::dep::{RawDependency, ResolvedTarget};
use crate::error::ResolveError;
use crate::job::JobContext;
use crate::resolve::{normalize_repo_url, within_namespace, PackageIndex, ResolveCache};
use crate::toolchain::Resolver;
use crate::unit::UnitId;

/// Resolves Go import paths to the package directory of their owning repository.
pub struct GoResolver {
    version: GoVersion,
    index: Arc<dyn PackageIndex>,
    cache: ResolveCache,
}

impl GoResolver {
    pub fn new(version: GoVersion, index: Arc<dyn PackageIndex>) -> Self {
        Self {
            version,
            index,
            cache: ResolveCache::new(),
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Index-backed resolution; the result does not depend on the job.
    async fn lookup_import_path(&self, import_path: &str) -> Result<ResolvedTarget, ResolveError> {
        let entry = self
            .index
            .lookup(import_path)
            .await
            .map_err(|source| ResolveError::Lookup {
                reference: import_path.to_string(),
                source,
            })?;

        let dir = if entry.root_path.is_empty() {
            entry.import_path.as_str()
        } else {
            within_namespace(&entry.root_path, &entry.import_path).ok_or_else(|| {
                ResolveError::Location {
                    reference: import_path.to_string(),
                    message: format!(
                        "{} is not below repository root {}",
                        entry.import_path, entry.root_path
                    ),
                }
            })?
        };

        let target = ResolvedTarget::new(
            normalize_repo_url(&entry.repo_url),
            package_kind(),
            UnitId::from_dir(dir),
        );
        debug!(import_path, repo = %target.to_repo_clone_url, unit = %target.to_unit_id, "resolved through index");

        if entry.standard_distribution {
            Ok(target.pinned(&self.version.version, self.version.rev_spec()))
        } else {
            Ok(target)
        }
    }
}

#[async_trait]
impl Resolver for GoResolver {
    fn name(&self) -> &str {
        TOOLCHAIN_NAME
    }

    async fn resolve(
        &self,
        raw: &RawDependency,
        job: &JobContext,
    ) -> Result<ResolvedTarget, ResolveError> {
        let Some(import_path) = raw.target.as_str() else {
            return Err(ResolveError::InvalidPayload {
                target_type: import_path_target(),
                payload: raw.payload_key(),
            });
        };

        // Local targets depend on the job's repository and stay out of the cache.
        let config = GoConfig::for_job(job)?;
        if let Some(rel) = within_namespace(&config.base_import_path, import_path) {
            debug!(import_path, dir = rel, "resolved inside repository");
            return Ok(ResolvedTarget::new(
                job.repo_uri.as_str(),
                package_kind(),
                UnitId::from_dir(rel),
            ));
        }

        self.cache
            .get_or_resolve(import_path, || self.lookup_import_path(import_path))
            .await
    }
}
