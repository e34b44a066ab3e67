//! Subcommand entry points; each returns the process exit code

use anyhow::{Context, Result};
use std::env;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::commands::{MakeArgs, OutputFormatArg, UnitsArgs};
use crate::config::UnitgraphConfig;
use crate::container::{DockerRuntime, Executor};
use crate::error::CompileError;
use crate::graph::{CancelHandle, GraphCompiler, Maker, RunReport};
use crate::job::JobContext;
use crate::progress::LoggingHandler;
use crate::toolchain::ToolchainRegistry;
use crate::unit::SourceUnit;

/// Every rule succeeded.
pub const EXIT_OK: i32 = 0;
/// The graph ran but some rules failed.
pub const EXIT_RULES_FAILED: i32 = 1;
/// Nothing ran: bad configuration, unreadable repository or failed scan.
pub const EXIT_SETUP_FAILED: i32 = 2;

struct Session {
    job: Arc<JobContext>,
    compiler: GraphCompiler,
    config: Arc<UnitgraphConfig>,
}

async fn open_session(
    path: Option<&PathBuf>,
    commit: Option<String>,
    config: UnitgraphConfig,
) -> Result<Session> {
    config.validate().context("invalid configuration")?;
    debug!("{}", config);
    let config = Arc::new(config);

    let repo_path = match path {
        Some(p) => p.clone(),
        None => env::current_dir().context("failed to get current directory")?,
    };

    let registry =
        ToolchainRegistry::with_defaults(&config).context("failed to register toolchains")?;

    let runtime = DockerRuntime::connect().context("failed to connect to the container runtime")?;
    let executor = Arc::new(Executor::new(Arc::new(runtime), config.command_timeout()));

    let job = JobContext::discover(&repo_path, commit, config.clone(), executor)
        .await
        .with_context(|| format!("failed to open repository {}", repo_path.display()))?;

    let compiler = GraphCompiler::new(Arc::new(registry)).with_progress(Arc::new(LoggingHandler));
    Ok(Session {
        job: Arc::new(job),
        compiler,
        config,
    })
}

pub async fn handle_make(args: &MakeArgs) -> i32 {
    let mut config = UnitgraphConfig::default();
    if let Some(jobs) = args.jobs {
        config.concurrency = jobs;
    }
    if let Some(timeout) = args.timeout {
        config.command_timeout_secs = timeout;
    }

    let session = match open_session(args.repository_path.as_ref(), args.commit.clone(), config).await {
        Ok(session) => session,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_SETUP_FAILED;
        }
    };

    info!(repo = %session.job.repo_uri, commit = %session.job.commit_id, "building dependency graph");
    let graph = match session.compiler.compile(session.job.clone()).await {
        Ok(graph) => graph,
        Err(e) => {
            report_compile_error(&e);
            return EXIT_SETUP_FAILED;
        }
    };

    let maker = Maker::new(session.config.concurrency).with_progress(Arc::new(LoggingHandler));
    let interrupt = cancel_on(tokio::signal::ctrl_c(), maker.cancel_handle());
    let result = maker.run(&graph).await;
    interrupt.abort();

    match result {
        Ok(report) => {
            print_summary(&report);
            EXIT_OK
        }
        Err(err) => {
            print_summary(&err.report);
            eprintln!();
            for failure in &err.failures {
                eprintln!("FAILED {}", failure);
            }
            EXIT_RULES_FAILED
        }
    }
}

pub async fn handle_units(args: &UnitsArgs) -> i32 {
    let session = match open_session(
        args.repository_path.as_ref(),
        args.commit.clone(),
        UnitgraphConfig::default(),
    )
    .await
    {
        Ok(session) => session,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_SETUP_FAILED;
        }
    };

    let units = match session.compiler.scan(session.job.clone()).await {
        Ok(units) => units,
        Err(e) => {
            report_compile_error(&e);
            return EXIT_SETUP_FAILED;
        }
    };

    match format_units(&units, args.format) {
        Ok(text) => {
            println!("{}", text);
            EXIT_OK
        }
        Err(e) => {
            error!("failed to format units: {:#}", e);
            EXIT_SETUP_FAILED
        }
    }
}

/// Cancels the run once `signal` fires. Rules already running still finish.
fn cancel_on<F>(signal: F, cancel: CancelHandle) -> JoinHandle<()>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                warn!("interrupted, waiting for running rules to finish");
                cancel.cancel();
            }
            Err(e) => debug!("cannot listen for interrupts: {}", e),
        }
    })
}

fn report_compile_error(err: &CompileError) {
    match err {
        CompileError::Configuration(e) => {
            error!("toolchain configuration error: {}", e);
            eprintln!("\nCheck the registered toolchains and the repository's unitgraph.yml.");
        }
        other => error!("failed to compile build graph: {}", other),
    }
}

fn print_summary(report: &RunReport) {
    println!(
        "{} executed, {} up to date, {} failed, {} unresolved dependencies ({:.1}s)",
        report.executed.len(),
        report.skipped.len(),
        report.failed.len(),
        report.unresolved,
        report.duration.as_secs_f64()
    );
}

fn format_units(units: &[SourceUnit], format: OutputFormatArg) -> Result<String> {
    match format {
        OutputFormatArg::Json => {
            serde_json::to_string_pretty(units).context("failed to serialize units")
        }
        OutputFormatArg::Human => {
            let mut out = format!("{} unit(s)", units.len());
            for unit in units {
                out.push_str(&format!(
                    "\n  {:<40} {} ({} files)",
                    unit.key().to_string(),
                    unit.name,
                    unit.files.len()
                ));
            }
            Ok(out)
        }
    }
}
