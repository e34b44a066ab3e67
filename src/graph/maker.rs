//! Incremental, concurrent execution of a build graph
//!
//! A rule becomes ready once every rule producing its inputs has succeeded.
//! Ready rules run on a `JoinSet`, at most `concurrency` at a time. A rule
//! whose outputs all exist and are no older than its newest input is skipped.
//! A failed rule loses its outputs and fails every rule downstream of it;
//! unrelated branches keep running.

use futures_util::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::rule::{Action, ActionOutput, BuildGraph};
use crate::error::{AggregateError, RuleError, RuleFailure};
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};

/// Summary of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Rules whose action ran and succeeded, in completion order
    pub executed: Vec<String>,
    /// Rules whose outputs were already up to date
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    /// Dependencies recorded as unresolved by successful rules
    pub unresolved: usize,
    pub duration: Duration,
}

/// Stops a run from starting further rules; rules already running finish.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Waiting,
    Running,
    Succeeded,
    Failed,
}

enum Outcome {
    Executed(ActionOutput),
    Skipped,
}

pub struct Maker {
    concurrency: usize,
    progress: Arc<dyn ProgressHandler>,
    cancel: CancelHandle,
}

impl Maker {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            progress: Arc::new(NoOpHandler),
            cancel: CancelHandle::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Runs every stale rule of `graph`.
    ///
    /// Outputs of successful rules stay on disk even when the run as a whole
    /// fails; the error lists every failed rule with its cause.
    pub async fn run(&self, graph: &BuildGraph) -> Result<RunReport, AggregateError> {
        let started = Instant::now();
        let total = graph.len();
        self.progress.on_progress(&ProgressEvent::RunStarted { rules: total });
        info!(rules = total, concurrency = self.concurrency, "running build graph");

        let mut state = vec![State::Waiting; total];
        let mut pending: Vec<usize> = (0..total).map(|i| graph.dependencies(i).len()).collect();
        let mut ready: VecDeque<usize> = graph
            .order()
            .iter()
            .copied()
            .filter(|&i| pending[i] == 0)
            .collect();

        let mut report = RunReport::default();
        let mut failures: Vec<RuleFailure> = Vec::new();
        let mut running: JoinSet<(usize, Result<Outcome, RuleError>)> = JoinSet::new();

        loop {
            while running.len() < self.concurrency && !self.cancel.is_cancelled() {
                let Some(idx) = ready.pop_front() else { break };
                state[idx] = State::Running;

                let rule = graph.rule(idx);
                let name = rule.name.clone();
                let inputs = rule.inputs.clone();
                let outputs = rule.outputs.clone();
                let action = rule.action.clone();
                let progress = self.progress.clone();
                running.spawn(async move {
                    let outcome = run_rule(&name, &inputs, &outputs, action, progress).await;
                    (idx, outcome)
                });
            }

            let Some(joined) = running.join_next().await else { break };
            let (idx, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    // Unreachable while rule futures are unwind-guarded; leftovers are reported below.
                    error!(error = %e, "rule task aborted");
                    continue;
                }
            };
            let name = graph.rule(idx).name.clone();

            match outcome {
                Ok(outcome) => {
                    state[idx] = State::Succeeded;
                    match outcome {
                        Outcome::Executed(output) => {
                            report.unresolved += output.unresolved;
                            report.executed.push(name);
                        }
                        Outcome::Skipped => report.skipped.push(name),
                    }
                    for &dependent in graph.dependents(idx) {
                        pending[dependent] -= 1;
                        if pending[dependent] == 0 && state[dependent] == State::Waiting {
                            ready.push_back(dependent);
                        }
                    }
                }
                Err(err) => {
                    error!(rule = %name, error = %err, "rule failed");
                    state[idx] = State::Failed;
                    report.failed.push(name.clone());
                    failures.push(RuleFailure {
                        rule: name.clone(),
                        error: err,
                    });
                    fail_downstream(graph, idx, &name, &mut state, &mut report, &mut failures);
                }
            }
        }

        for idx in graph.order().iter().copied() {
            let reason = match state[idx] {
                State::Waiting if self.cancel.is_cancelled() => RuleError::Cancelled,
                State::Waiting | State::Running => {
                    RuleError::Panicked("rule never completed".to_string())
                }
                State::Succeeded | State::Failed => continue,
            };
            let name = graph.rule(idx).name.clone();
            state[idx] = State::Failed;
            report.failed.push(name.clone());
            failures.push(RuleFailure {
                rule: name,
                error: reason,
            });
        }

        report.duration = started.elapsed();
        self.progress.on_progress(&ProgressEvent::RunFinished {
            executed: report.executed.len(),
            skipped: report.skipped.len(),
            failed: report.failed.len(),
            duration: report.duration,
        });

        if failures.is_empty() {
            info!(
                executed = report.executed.len(),
                skipped = report.skipped.len(),
                unresolved = report.unresolved,
                "build graph complete"
            );
            Ok(report)
        } else {
            warn!(failed = failures.len(), "build graph finished with failures");
            Err(AggregateError { failures, report })
        }
    }
}

/// Marks every rule reachable from `root` as failed because of it.
fn fail_downstream(
    graph: &BuildGraph,
    root: usize,
    root_name: &str,
    state: &mut [State],
    report: &mut RunReport,
    failures: &mut Vec<RuleFailure>,
) {
    let mut queue: VecDeque<usize> = graph.dependents(root).iter().copied().collect();
    while let Some(idx) = queue.pop_front() {
        if state[idx] != State::Waiting {
            continue;
        }
        state[idx] = State::Failed;
        let name = graph.rule(idx).name.clone();
        debug!(rule = %name, cause = %root_name, "skipping rule after failed input");
        report.failed.push(name.clone());
        failures.push(RuleFailure {
            rule: name,
            error: RuleError::DependencyFailed(root_name.to_string()),
        });
        queue.extend(graph.dependents(idx).iter().copied());
    }
}

async fn run_rule(
    name: &str,
    inputs: &[PathBuf],
    outputs: &[PathBuf],
    action: Arc<dyn Action>,
    progress: Arc<dyn ProgressHandler>,
) -> Result<Outcome, RuleError> {
    if is_up_to_date(inputs, outputs) {
        progress.on_progress(&ProgressEvent::RuleSkipped {
            rule: name.to_string(),
        });
        return Ok(Outcome::Skipped);
    }

    progress.on_progress(&ProgressEvent::RuleStarted {
        rule: name.to_string(),
    });
    let started = Instant::now();

    let result = match AssertUnwindSafe(action.run()).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(RuleError::Panicked(panic_message(panic.as_ref()))),
    };

    if result.is_err() {
        for output in outputs {
            if let Err(e) = std::fs::remove_file(output) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %output.display(), error = %e, "failed to remove output of failed rule");
                }
            }
        }
    }

    progress.on_progress(&ProgressEvent::RuleFinished {
        rule: name.to_string(),
        duration: started.elapsed(),
        success: result.is_ok(),
    });
    result.map(Outcome::Executed)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// All outputs exist and the oldest is not older than the newest input.
/// A missing input makes the rule stale.
pub fn is_up_to_date(inputs: &[PathBuf], outputs: &[PathBuf]) -> bool {
    if outputs.is_empty() {
        return false;
    }

    let mut oldest_output: Option<SystemTime> = None;
    for output in outputs {
        let Some(time) = modified(output) else {
            return false;
        };
        oldest_output = Some(oldest_output.map_or(time, |t| t.min(time)));
    }

    let mut newest_input: Option<SystemTime> = None;
    for input in inputs {
        let Some(time) = modified(input) else {
            return false;
        };
        newest_input = Some(newest_input.map_or(time, |t| t.max(time)));
    }

    match (oldest_output, newest_input) {
        (Some(out), Some(input)) => out >= input,
        (Some(_), None) => true,
        _ => false,
    }
}
