//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { rules } => {
                info!(rules, "Starting build graph run");
            }
            ProgressEvent::RuleStarted { rule } => {
                debug!(rule = %rule, "Running rule");
            }
            ProgressEvent::RuleSkipped { rule } => {
                debug!(rule = %rule, "Rule up to date");
            }
            ProgressEvent::RuleFinished {
                rule,
                duration,
                success,
            } => {
                if *success {
                    info!(rule = %rule, duration_ms = duration.as_millis(), "Rule complete");
                } else {
                    warn!(rule = %rule, duration_ms = duration.as_millis(), "Rule failed");
                }
            }
            ProgressEvent::RunFinished {
                executed,
                skipped,
                failed,
                duration,
            } => {
                if *failed > 0 {
                    warn!(
                        executed,
                        skipped,
                        failed,
                        duration_ms = duration.as_millis(),
                        "Build graph run finished with failures"
                    );
                } else {
                    info!(
                        executed,
                        skipped,
                        duration_ms = duration.as_millis(),
                        "Build graph run complete"
                    );
                }
            }
        }
    }
}
