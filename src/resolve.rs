//! Resolution building blocks shared by resolvers
//!
//! [`PackageIndex`] answers "which repository owns this reference" for
//! targets outside the current repository. [`ResolveCache`] memoizes resolved
//! targets per payload: a hit never touches the network, the first stored
//! entry stays authoritative, and concurrent misses for the same payload are
//! coalesced into one resolution.

use async_trait::async_trait;
use std::future::Future;
use tracing::trace;

use crate::dep::ResolvedTarget;
use crate::error::{IndexError, ResolveError};
use crate::util::OnceMap;

/// Answer of a package index for one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Canonical clone URL of the owning repository
    pub repo_url: String,
    /// Namespace of the repository root, e.g. `github.com/acme/lib`
    pub root_path: String,
    /// Absolute form of the looked-up reference
    pub import_path: String,
    /// Part of a pinned standard distribution rather than a live repository
    pub standard_distribution: bool,
}

#[async_trait]
pub trait PackageIndex: Send + Sync {
    async fn lookup(&self, reference: &str) -> Result<IndexEntry, IndexError>;
}

#[derive(Default)]
pub struct ResolveCache {
    entries: OnceMap<String, ResolvedTarget>,
}

impl ResolveCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, payload: &str) -> Option<ResolvedTarget> {
        self.entries.get(&payload.to_string())
    }

    /// Returns the cached target for `payload` or runs `resolve` once to fill it.
    ///
    /// Failed resolutions are not cached, so a later call retries.
    pub async fn get_or_resolve<F, Fut>(
        &self,
        payload: &str,
        resolve: F,
    ) -> Result<ResolvedTarget, ResolveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ResolvedTarget, ResolveError>>,
    {
        if let Some(hit) = self.get(payload) {
            trace!(payload, "resolution cache hit");
            return Ok(hit);
        }
        self.entries.get_or_try_init(payload.to_string(), resolve).await
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Path of `reference` below namespace `base`, or `None` if it lies outside.
///
/// Matching happens at `/` boundaries only: `app/utility` is not inside
/// `app/util`. The base itself maps to the empty path.
pub fn within_namespace<'a>(base: &str, reference: &'a str) -> Option<&'a str> {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        return None;
    }
    let rest = reference.strip_prefix(base)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('/')
    }
}

/// Strips trailing path separators so equal repositories compare equal.
pub fn normalize_repo_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{UnitId, UnitKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn target(repo: &str) -> ResolvedTarget {
        ResolvedTarget::new(repo, UnitKind::new("GoPackage"), UnitId::from_dir("x"))
    }

    #[test]
    fn test_within_namespace() {
        assert_eq!(within_namespace("app/util", "app/util/internal"), Some("internal"));
        assert_eq!(within_namespace("app/util", "app/util"), Some(""));
        assert_eq!(within_namespace("app/util/", "app/util/a/b"), Some("a/b"));
        assert_eq!(within_namespace("app/util", "app/utility"), None);
        assert_eq!(within_namespace("app/util", "example.org/lib"), None);
        assert_eq!(within_namespace("", "fmt"), None);
    }

    #[test]
    fn test_normalize_repo_url() {
        assert_eq!(normalize_repo_url("https://example.org/lib/"), "https://example.org/lib");
        assert_eq!(normalize_repo_url("https://example.org/lib"), "https://example.org/lib");
    }

    #[tokio::test]
    async fn test_hit_skips_resolution() {
        let cache = ResolveCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let resolved = cache
                .get_or_resolve("example.org/lib", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(target("https://example.org/lib"))
                })
                .await
                .unwrap();
            assert_eq!(resolved.to_repo_clone_url, "https://example.org/lib");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_existing_entry_is_authoritative() {
        let cache = ResolveCache::new();
        cache
            .get_or_resolve("p", || async { Ok(target("first")) })
            .await
            .unwrap();
        let second = cache
            .get_or_resolve("p", || async { Ok(target("second")) })
            .await
            .unwrap();
        assert_eq!(second.to_repo_clone_url, "first");
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache = ResolveCache::new();
        let err = cache
            .get_or_resolve("p", || async {
                Err(ResolveError::Lookup {
                    reference: "p".to_string(),
                    source: IndexError::NotFound("p".to_string()),
                })
            })
            .await;
        assert!(err.is_err());
        assert!(cache.is_empty());

        let ok = cache
            .get_or_resolve("p", || async { Ok(target("r")) })
            .await
            .unwrap();
        assert_eq!(ok.to_repo_clone_url, "r");
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_resolution() {
        let cache = Arc::new(ResolveCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_resolve("example.org/lib", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(target("https://example.org/lib"))
                    })
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
