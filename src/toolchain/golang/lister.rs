use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

use super::{import_path_target, GoConfig, GoVersion, TOOLCHAIN_NAME};
use crate::container::ContainerCommand;
use crate::dep::{RawDependency, TargetType};
use crate::error::{ToolchainError, TransformError};
use crate::job::JobContext;
use crate::toolchain::CommandLister;
use crate::unit::SourceUnit;

/// cgo pseudo-package; not a real dependency.
const CGO_PSEUDO_IMPORT: &str = "C";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct PackageImports {
    import_path: String,
    imports: Vec<String>,
    test_imports: Vec<String>,
    x_test_imports: Vec<String>,
}

impl PackageImports {
    fn into_dependencies(self, include_tests: bool) -> Vec<RawDependency> {
        let PackageImports {
            import_path,
            mut imports,
            test_imports,
            x_test_imports,
        } = self;
        if include_tests {
            imports.extend(test_imports);
            imports.extend(x_test_imports);
        }

        let mut seen = HashSet::new();
        imports
            .into_iter()
            .filter(|p| p != CGO_PSEUDO_IMPORT && *p != import_path)
            .filter(|p| seen.insert(p.clone()))
            .map(|p| RawDependency::new(import_path_target(), Value::String(p)))
            .collect()
    }
}

fn decode_imports(stdout: &[u8], include_tests: bool) -> Result<Vec<RawDependency>, TransformError> {
    let imports: PackageImports = serde_json::from_slice(stdout)?;
    Ok(imports.into_dependencies(include_tests))
}

/// Lists a package's imports with `go list`, run against the package directory.
pub struct GoLister {
    version: GoVersion,
}

impl GoLister {
    pub fn new(version: GoVersion) -> Self {
        Self { version }
    }
}

impl CommandLister for GoLister {
    fn name(&self) -> &str {
        TOOLCHAIN_NAME
    }

    fn target_types(&self) -> Vec<TargetType> {
        vec![import_path_target()]
    }

    fn command(
        &self,
        unit: &SourceUnit,
        job: &JobContext,
    ) -> Result<ContainerCommand<Vec<RawDependency>>, ToolchainError> {
        if unit.kind != super::package_kind() {
            return Err(ToolchainError::InvalidUnit {
                toolchain: TOOLCHAIN_NAME.to_string(),
                unit: unit.key().to_string(),
                message: format!("expected a {} unit", super::PACKAGE_KIND),
            });
        }

        let config = GoConfig::for_job(job)?;
        let include_tests = config.include_test_imports;
        let package = if unit.dir.is_empty() {
            ".".to_string()
        } else {
            format!("./{}", unit.dir)
        };

        let args = vec![
            "go".to_string(),
            "list".to_string(),
            "-e".to_string(),
            "-json=ImportPath,Imports,TestImports,XTestImports".to_string(),
            package,
        ];
        Ok(self.version.command(&config.base_import_path, args, move |stdout| {
            decode_imports(stdout, include_tests)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &[u8] = br#"{
        "ImportPath": "example.com/app/db",
        "Imports": ["C", "database/sql", "example.com/app/internal/util", "github.com/lib/pq"],
        "TestImports": ["testing", "database/sql"],
        "XTestImports": ["example.com/app/db", "github.com/stretchr/testify/assert"]
    }"#;

    fn payloads(deps: &[RawDependency]) -> Vec<String> {
        deps.iter().map(|d| d.payload_key()).collect()
    }

    #[test]
    fn test_imports_without_tests() {
        let deps = decode_imports(OUTPUT, false).unwrap();
        assert_eq!(
            payloads(&deps),
            vec!["database/sql", "example.com/app/internal/util", "github.com/lib/pq"]
        );
        assert!(deps.iter().all(|d| d.target_type == import_path_target()));
    }

    #[test]
    fn test_imports_with_tests_are_deduplicated() {
        let deps = decode_imports(OUTPUT, true).unwrap();
        assert_eq!(
            payloads(&deps),
            vec![
                "database/sql",
                "example.com/app/internal/util",
                "github.com/lib/pq",
                "testing",
                "github.com/stretchr/testify/assert",
            ]
        );
    }

    #[test]
    fn test_package_without_imports() {
        let deps = decode_imports(br#"{"ImportPath": "example.com/app/empty"}"#, true).unwrap();
        assert!(deps.is_empty());
    }

    #[test]
    fn test_malformed_output() {
        assert!(matches!(
            decode_imports(b"can't load package", false),
            Err(TransformError::Json(_))
        ));
    }
}
