//! Structured logging setup
//!
//! Uses the `tracing` ecosystem. Output is pretty console text by default or
//! JSON for machine consumption, filtered through `RUST_LOG` when it is set.
//!
//! ```no_run
//! use unitgraph::util::logging;
//!
//! logging::init_from_env();
//! tracing::info!(repo = "github.com/acme/app", "compiling build graph");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Crates whose chatter is capped at WARN unless `RUST_LOG` says otherwise.
const NOISY_DEPENDENCIES: &[&str] = &["h2", "hyper", "hyper_util", "reqwest", "bollard"];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,

    /// Emit one JSON object per event instead of console text
    pub use_json: bool,

    pub include_target: bool,

    /// Include file and line number
    pub include_location: bool,

    /// Include thread ids and names; useful when rules run concurrently
    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
        }
    }

    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

/// Parses a level name case-insensitively, falling back to INFO.
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn build_filter(level: Level) -> EnvFilter {
    if env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }

    let mut filter = EnvFilter::new(format!("unitgraph={}", level));
    for dependency in NOISY_DEPENDENCIES {
        if let Ok(directive) = format!("{}=warn", dependency).parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level);

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids)
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Reads `UNITGRAPH_LOG_LEVEL` and `UNITGRAPH_LOG_JSON`.
pub fn init_from_env() {
    init_logging(config_from_env());
}

fn config_from_env() -> LoggingConfig {
    let level_str = env::var("UNITGRAPH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let use_json = env::var("UNITGRAPH_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    LoggingConfig {
        level: parse_level(&level_str),
        use_json,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("Warn"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
    }

    #[test]
    fn test_parse_level_invalid() {
        assert_eq!(parse_level("loud"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_presets() {
        let prod = LoggingConfig::production();
        assert!(prod.use_json);
        assert!(prod.include_thread_ids);

        let dev = LoggingConfig::development();
        assert_eq!(dev.level, Level::DEBUG);
        assert!(!dev.use_json);

        assert_eq!(LoggingConfig::with_level(Level::WARN).level, Level::WARN);
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        env::set_var("UNITGRAPH_LOG_LEVEL", "debug");
        env::set_var("UNITGRAPH_LOG_JSON", "true");

        let config = config_from_env();
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.use_json);

        env::remove_var("UNITGRAPH_LOG_LEVEL");
        env::remove_var("UNITGRAPH_LOG_JSON");
    }
}
