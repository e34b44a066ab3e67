//! `go-import` package index
//!
//! Answers which repository owns a Go import path the same way `go get`
//! does: standard library paths belong to the Go distribution, a few large
//! hosts have a fixed `host/owner/repo` layout, and everything else is asked
//! for its `<meta name="go-import">` tag over HTTPS.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::IndexError;
use crate::resolve::{normalize_repo_url, IndexEntry, PackageIndex};

pub const GO_DISTRIBUTION_URL: &str = "https://go.googlesource.com/go";

const FIXED_LAYOUT_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

/// Standard library paths have no dot in their first element (`net/http`).
pub fn is_standard_import_path(import_path: &str) -> bool {
    import_path
        .split('/')
        .next()
        .map(|first| !first.is_empty() && !first.contains('.'))
        .unwrap_or(false)
}

/// One `go-import` declaration: `prefix vcs repo-url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoImport {
    pub prefix: String,
    pub vcs: String,
    pub repo_url: String,
}

pub struct GoImportIndex {
    client: Client,
    meta_tag: Regex,
    meta_attr: Regex,
}

impl GoImportIndex {
    pub fn new(timeout: Duration) -> Result<Self, IndexError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("unitgraph/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IndexError::Client(e.to_string()))?;
        let meta_tag =
            Regex::new(r"(?is)<meta\s[^>]*>").map_err(|e| IndexError::Client(e.to_string()))?;
        let meta_attr = Regex::new(r#"(?is)\b(name|content)\s*=\s*["']([^"']*)["']"#)
            .map_err(|e| IndexError::Client(e.to_string()))?;
        Ok(Self {
            client,
            meta_tag,
            meta_attr,
        })
    }

    /// All `go-import` declarations found in an HTML page.
    pub fn parse_go_imports(&self, html: &str) -> Vec<GoImport> {
        let mut imports = Vec::new();
        for tag in self.meta_tag.find_iter(html) {
            let mut name = None;
            let mut content = None;
            for attr in self.meta_attr.captures_iter(tag.as_str()) {
                match attr[1].to_ascii_lowercase().as_str() {
                    "name" => name = Some(attr[2].to_string()),
                    "content" => content = Some(attr[2].to_string()),
                    _ => {}
                }
            }
            if name.as_deref() != Some("go-import") {
                continue;
            }
            let Some(content) = content else { continue };
            let fields: Vec<&str> = content.split_whitespace().collect();
            if let [prefix, vcs, repo_url] = fields[..] {
                imports.push(GoImport {
                    prefix: prefix.to_string(),
                    vcs: vcs.to_string(),
                    repo_url: repo_url.to_string(),
                });
            }
        }
        imports
    }

    async fn fetch(&self, import_path: &str) -> Result<IndexEntry, IndexError> {
        let url = format!("https://{}?go-get=1", import_path);
        debug!(url = %url, "fetching go-import metadata");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| IndexError::Network {
                reference: import_path.to_string(),
                message: e.to_string(),
            })?;
        let status = response.status();
        // Hosts may answer 404 for the package page while still serving the tag.
        let body = response.text().await.map_err(|e| IndexError::Network {
            reference: import_path.to_string(),
            message: e.to_string(),
        })?;

        self.entry_from_body(&body, status, import_path)
    }

    /// Picks the entry for `import_path` out of a `?go-get=1` response body.
    fn entry_from_body(
        &self,
        body: &str,
        status: reqwest::StatusCode,
        import_path: &str,
    ) -> Result<IndexEntry, IndexError> {
        let imports = self.parse_go_imports(body);
        match best_match(&imports, import_path) {
            Some(import) => Ok(IndexEntry {
                repo_url: normalize_repo_url(&import.repo_url),
                root_path: import.prefix.trim_end_matches('/').to_string(),
                import_path: import_path.to_string(),
                standard_distribution: false,
            }),
            None if status == reqwest::StatusCode::NOT_FOUND => {
                Err(IndexError::NotFound(import_path.to_string()))
            }
            None => Err(IndexError::InvalidResponse {
                reference: import_path.to_string(),
                message: format!("no go-import meta tag matches (HTTP {})", status),
            }),
        }
    }
}

/// Declaration with the longest prefix that contains `import_path`.
pub fn best_match<'a>(imports: &'a [GoImport], import_path: &str) -> Option<&'a GoImport> {
    imports
        .iter()
        .filter(|i| {
            let prefix = i.prefix.trim_end_matches('/');
            import_path == prefix
                || import_path
                    .strip_prefix(prefix)
                    .map(|rest| rest.starts_with('/'))
                    .unwrap_or(false)
        })
        .max_by_key(|i| i.prefix.len())
}

fn fixed_layout_entry(import_path: &str) -> Option<Result<IndexEntry, IndexError>> {
    let mut parts = import_path.split('/');
    let host = parts.next()?;
    if !FIXED_LAYOUT_HOSTS.contains(&host) {
        return None;
    }
    let (Some(owner), Some(repo)) = (parts.next(), parts.next()) else {
        return Some(Err(IndexError::NotFound(import_path.to_string())));
    };
    if owner.is_empty() || repo.is_empty() {
        return Some(Err(IndexError::NotFound(import_path.to_string())));
    }
    let root = format!("{}/{}/{}", host, owner, repo);
    Some(Ok(IndexEntry {
        repo_url: format!("https://{}", root),
        root_path: root,
        import_path: import_path.to_string(),
        standard_distribution: false,
    }))
}

#[async_trait]
impl PackageIndex for GoImportIndex {
    async fn lookup(&self, reference: &str) -> Result<IndexEntry, IndexError> {
        let import_path = reference.trim_matches('/');
        if import_path.is_empty() {
            return Err(IndexError::NotFound(reference.to_string()));
        }

        if is_standard_import_path(import_path) {
            return Ok(IndexEntry {
                repo_url: GO_DISTRIBUTION_URL.to_string(),
                root_path: String::new(),
                import_path: import_path.to_string(),
                standard_distribution: true,
            });
        }

        if let Some(entry) = fixed_layout_entry(import_path) {
            return entry;
        }

        self.fetch(import_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> GoImportIndex {
        GoImportIndex::new(Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_standard_import_paths() {
        assert!(is_standard_import_path("fmt"));
        assert!(is_standard_import_path("net/http"));
        assert!(!is_standard_import_path("github.com/acme/lib"));
        assert!(!is_standard_import_path("example.org/lib"));
        assert!(!is_standard_import_path(""));
    }

    #[tokio::test]
    async fn test_lookup_standard_library() {
        let entry = index().lookup("net/http").await.unwrap();
        assert_eq!(entry.repo_url, GO_DISTRIBUTION_URL);
        assert_eq!(entry.root_path, "");
        assert!(entry.standard_distribution);
    }

    #[tokio::test]
    async fn test_lookup_fixed_layout_host() {
        let entry = index().lookup("github.com/acme/lib/sub/pkg").await.unwrap();
        assert_eq!(entry.repo_url, "https://github.com/acme/lib");
        assert_eq!(entry.root_path, "github.com/acme/lib");
        assert_eq!(entry.import_path, "github.com/acme/lib/sub/pkg");
        assert!(!entry.standard_distribution);

        assert!(matches!(
            index().lookup("github.com/acme").await,
            Err(IndexError::NotFound(_))
        ));
    }

    #[test]
    fn test_parse_go_imports() {
        let html = r#"<html><head>
            <meta name="go-import" content="example.org/lib git https://code.example.org/lib/">
            <meta content="example.org/lib/v2 git https://code.example.org/lib-v2" name="go-import"/>
            <meta name="go-source" content="example.org/lib _ _ _">
            </head></html>"#;

        let imports = index().parse_go_imports(html);
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].repo_url, "https://code.example.org/lib/");
        assert_eq!(imports[1].prefix, "example.org/lib/v2");
    }

    #[test]
    fn test_entry_from_body_picks_declaring_repository() {
        let html = r#"<meta name="go-import" content="example.org/lib git https://code.example.org/lib.git/">"#;
        let index = index();

        let entry = index
            .entry_from_body(html, reqwest::StatusCode::OK, "example.org/lib/sub")
            .unwrap();
        assert_eq!(entry.root_path, "example.org/lib");
        assert_eq!(entry.import_path, "example.org/lib/sub");
        assert_eq!(entry.repo_url, normalize_repo_url("https://code.example.org/lib.git/"));
        assert!(!entry.standard_distribution);

        // A 404 page may still carry the tag.
        assert!(index
            .entry_from_body(html, reqwest::StatusCode::NOT_FOUND, "example.org/lib")
            .is_ok());
    }

    #[test]
    fn test_entry_from_body_without_matching_tag() {
        let html = r#"<meta name="go-import" content="example.org/lib git https://code.example.org/lib">"#;
        let index = index();

        assert!(matches!(
            index.entry_from_body(html, reqwest::StatusCode::NOT_FOUND, "example.org/library"),
            Err(IndexError::NotFound(_))
        ));
        assert!(matches!(
            index.entry_from_body("<html></html>", reqwest::StatusCode::OK, "example.org/lib"),
            Err(IndexError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_best_match_prefers_longest_prefix_at_boundary() {
        let imports = vec![
            GoImport {
                prefix: "example.org/lib".to_string(),
                vcs: "git".to_string(),
                repo_url: "a".to_string(),
            },
            GoImport {
                prefix: "example.org/lib/v2".to_string(),
                vcs: "git".to_string(),
                repo_url: "b".to_string(),
            },
        ];
        assert_eq!(best_match(&imports, "example.org/lib/v2/x").unwrap().repo_url, "b");
        assert_eq!(best_match(&imports, "example.org/lib/x").unwrap().repo_url, "a");
        assert!(best_match(&imports, "example.org/library").is_none());
    }
}
