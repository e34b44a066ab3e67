//! Progress handler trait and events

use std::time::Duration;

/// Events emitted while a build graph runs
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Run started with this many rules
    RunStarted { rules: usize },

    /// Rule action started
    RuleStarted { rule: String },

    /// Rule outputs were up to date
    RuleSkipped { rule: String },

    /// Rule action returned
    RuleFinished {
        rule: String,
        duration: Duration,
        success: bool,
    },

    /// Run completed, successfully or not
    RunFinished {
        executed: usize,
        skipped: usize,
        failed: usize,
        duration: Duration,
    },
}

/// Receives progress events; called from concurrently running rules.
pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
