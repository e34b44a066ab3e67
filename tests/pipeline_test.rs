//! Scan, list and resolve a Go repository end to end with a scripted container runtime

mod support;

use filetime::{set_file_mtime, FileTime};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use support::{job, repo_config, ScriptedRuntime, StubIndex};
use unitgraph::buildstore::{BuildStore, Stage};
use unitgraph::container::{RunOutput, RunRequest};
use unitgraph::error::{CompileError, RuleError};
use unitgraph::graph::{GraphCompiler, Maker};
use unitgraph::job::{JobContext, RepoUri};
use unitgraph::toolchain::golang::{self, GoToolchain, GoVersion};
use unitgraph::toolchain::ToolchainRegistry;
use unitgraph::unit::{UnitId, UnitKey, UnitKind};

const URI: &str = "example.com/app";
const REPO_YAML: &str = "toolchains:\n  go:\n    base_import_path: example.com/app\n";

const PACKAGES: &str = r#"{
    "Dir": "/go/src/example.com/app",
    "ImportPath": "example.com/app",
    "Name": "main",
    "GoFiles": ["main.go"]
}
{
    "Dir": "/go/src/example.com/app/util",
    "ImportPath": "example.com/app/util",
    "Name": "util",
    "GoFiles": ["util.go"]
}
{
    "Dir": "/go/src/example.com/app/broken",
    "ImportPath": "example.com/app/broken",
    "Name": "broken",
    "GoFiles": ["broken.go"]
}
{
    "Dir": "/usr/local/go/src/fmt",
    "ImportPath": "fmt",
    "Name": "fmt",
    "Standard": true
}
"#;

const ROOT_IMPORTS: &str = r#"{
    "ImportPath": "example.com/app",
    "Imports": ["example.com/app/util", "fmt", "github.com/pkg/errors"]
}"#;

const UTIL_IMPORTS: &str = r#"{
    "ImportPath": "example.com/app/util",
    "Imports": ["C", "example.com/nowhere/x", "strings"]
}"#;

/// Answers `go list` the way a real Go image would for the fixture repository.
fn go_list(request: &RunRequest) -> RunOutput {
    let args: Vec<&str> = request.args.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["go", "list", "-e", "-json", "./..."] => RunOutput::success(PACKAGES),
        ["go", "list", "-e", fields, package] if fields.starts_with("-json=") => match *package {
            "." => RunOutput::success(ROOT_IMPORTS),
            "./util" => RunOutput::success(UTIL_IMPORTS),
            _ => RunOutput {
                exit_code: 1,
                stdout: Vec::new(),
                stderr: b"go: permission denied".to_vec(),
            },
        },
        _ => RunOutput::failure(2, format!("unexpected command {:?}", args)),
    }
}

struct Fixture {
    repo: TempDir,
    store: TempDir,
    runtime: Arc<ScriptedRuntime>,
    index: Arc<StubIndex>,
    job: Arc<JobContext>,
    compiler: GraphCompiler,
}

impl Fixture {
    fn new() -> Self {
        let repo = TempDir::new().unwrap();
        write(repo.path(), "unitgraph.yml", REPO_YAML);
        write(repo.path(), "main.go", "package main\n");
        write(repo.path(), "util/util.go", "package util\n");
        write(repo.path(), "broken/broken.go", "package broken\n");

        let store = TempDir::new().unwrap();
        let runtime = Arc::new(ScriptedRuntime::new(go_list));
        let index = Arc::new(
            StubIndex::new()
                .with_entry("fmt", "https://go.googlesource.com/go", "", true)
                .with_entry("strings", "https://go.googlesource.com/go", "", true)
                .with_entry(
                    "github.com/pkg/errors",
                    "https://github.com/pkg/errors/",
                    "github.com/pkg/errors",
                    false,
                ),
        );

        let mut registry = ToolchainRegistry::new();
        golang::register(
            &mut registry,
            GoToolchain::new(GoVersion::new("1.22.5"), index.clone()),
        )
        .unwrap();

        let job = Arc::new(job(
            repo.path(),
            store.path(),
            URI,
            repo_config(REPO_YAML),
            runtime.clone(),
        ));
        let compiler = GraphCompiler::new(Arc::new(registry));

        Self {
            repo,
            store,
            runtime,
            index,
            job,
            compiler,
        }
    }

    fn build_store(&self) -> BuildStore {
        BuildStore::open(self.store.path(), &RepoUri::parse(URI), "0123abcd").unwrap()
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn key(id: &str) -> UnitKey {
    UnitKey {
        kind: UnitKind::new("GoPackage"),
        id: UnitId::from_dir(id),
    }
}

#[tokio::test]
async fn test_compile_scans_and_plans_every_unit() {
    let fx = Fixture::new();

    let graph = fx.compiler.compile(fx.job.clone()).await.unwrap();

    // scan plus a list and a resolve rule for each of the three packages
    assert_eq!(graph.len(), 7);
    assert!(graph.find("scan").is_some());
    assert!(graph.find("list:GoPackage:.").is_some());
    assert!(graph.find("resolve:GoPackage:util").is_some());

    let units = fx.build_store().read_units().unwrap();
    let ids: Vec<&str> = units.iter().map(|u| u.dir.as_str()).collect();
    assert_eq!(ids, vec!["", "broken", "util"]);
    assert_eq!(units[2].files, vec!["util/util.go"]);
    assert_eq!(fx.runtime.run_count(), 1);
}

#[tokio::test]
async fn test_make_isolates_failing_unit() {
    let fx = Fixture::new();
    let graph = fx.compiler.compile(fx.job.clone()).await.unwrap();

    let err = Maker::new(4).run(&graph).await.unwrap_err();

    let failed: Vec<&str> = err.failures.iter().map(|f| f.rule.as_str()).collect();
    assert_eq!(failed, vec!["list:GoPackage:broken", "resolve:GoPackage:broken"]);
    assert!(err.failures[0].error.to_string().contains("permission denied"));
    assert!(matches!(
        err.failures[1].error,
        RuleError::DependencyFailed(ref rule) if rule == "list:GoPackage:broken"
    ));

    let store = fx.build_store();
    assert!(!store.artifact_path(Stage::Deps, &key("broken")).unwrap().exists());
    assert!(store.read_resolution(&key("util")).is_ok());

    let root = store.read_resolution(&key("")).unwrap();
    let targets: Vec<(&str, &str)> = root
        .resolved
        .iter()
        .map(|d| {
            let target = d.target.as_ref().unwrap();
            (target.to_repo_clone_url.as_str(), target.to_unit_id.as_str())
        })
        .collect();
    assert_eq!(
        targets,
        vec![
            ("example.com/app", "util"),
            ("https://go.googlesource.com/go", "fmt"),
            ("https://github.com/pkg/errors", ""),
        ]
    );
    assert_eq!(root.resolved[1].target.as_ref().unwrap().to_rev_spec.as_deref(), Some("go1.22.5"));

    // The unknown module is recorded, not fatal.
    let util = store.read_resolution(&key("util")).unwrap();
    let unresolved: Vec<String> = util.unresolved().map(|d| d.raw.payload_key()).collect();
    assert_eq!(unresolved, vec!["example.com/nowhere/x"]);
    assert_eq!(util.resolved.len(), 2);
    assert_eq!(err.report.unresolved, 1);
}

#[tokio::test]
async fn test_rerun_skips_up_to_date_rules() {
    let fx = Fixture::new();

    let graph = fx.compiler.compile(fx.job.clone()).await.unwrap();
    let _ = Maker::new(4).run(&graph).await;
    let runs = fx.runtime.run_count();
    let lookups = fx.index.lookups().len();

    let graph = fx.compiler.compile(fx.job.clone()).await.unwrap();
    let err = Maker::new(4).run(&graph).await.unwrap_err();

    // Only the failing list is retried; everything else is fresh.
    assert_eq!(err.report.executed, Vec::<String>::new());
    assert_eq!(err.report.skipped.len(), 5);
    assert_eq!(fx.runtime.run_count(), runs + 1);
    assert_eq!(fx.index.lookups().len(), lookups);
    assert!(fx
        .runtime
        .runs()
        .last()
        .unwrap()
        .args
        .contains(&"./broken".to_string()));
}

#[tokio::test]
async fn test_removed_package_directory_triggers_rescan() {
    let fx = Fixture::new();
    fx.compiler.compile(fx.job.clone()).await.unwrap();
    assert_eq!(fx.runtime.run_count(), 1);

    let old = FileTime::from_unix_time(1_000_000, 0);
    for rel in ["", "unitgraph.yml", "main.go", "util", "util/util.go", "broken", "broken/broken.go"] {
        set_file_mtime(fx.repo.path().join(rel), old).unwrap();
    }
    set_file_mtime(fx.build_store().units_path(), FileTime::from_unix_time(2_000_000, 0)).unwrap();

    fx.compiler.compile(fx.job.clone()).await.unwrap();
    assert_eq!(fx.runtime.run_count(), 1);

    std::fs::remove_dir_all(fx.repo.path().join("broken")).unwrap();
    fx.compiler.compile(fx.job.clone()).await.unwrap();
    assert_eq!(fx.runtime.run_count(), 2);
}

#[tokio::test]
async fn test_repository_is_mounted_read_only_at_import_path() {
    let fx = Fixture::new();
    fx.compiler.compile(fx.job.clone()).await.unwrap();

    let scan = &fx.runtime.runs()[0];
    assert_eq!(scan.workdir.as_deref(), Some("/go/src/example.com/app"));
    assert_eq!(scan.mounts.len(), 1);
    assert_eq!(scan.mounts[0].container, "/go/src/example.com/app");
    assert_eq!(scan.mounts[0].host, fx.repo.path());
    assert!(scan.mounts[0].to_bind().ends_with(":ro"));
    assert_eq!(fx.runtime.images_prepared(), 1);
}

#[tokio::test]
async fn test_missing_lister_aborts_compilation() {
    let fx = Fixture::new();
    let empty = GraphCompiler::new(Arc::new(ToolchainRegistry::new()));

    // With no scanners the scan succeeds with no units, so the graph is just the scan.
    let graph = empty.compile(fx.job.clone()).await.unwrap();
    assert_eq!(graph.len(), 1);

    let mut registry = ToolchainRegistry::new();
    registry
        .register_scanner(Arc::new(golang::GoScanner::new(GoVersion::new("1.22.5"))))
        .unwrap();
    let err = GraphCompiler::new(Arc::new(registry))
        .compile(fx.job.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, CompileError::Configuration(_)));
}
