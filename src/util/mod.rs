//! Shared utilities: logging setup and keyed single-flight memoization

pub mod logging;
pub mod single_flight;

pub use logging::{init_default, init_from_env, init_logging, LoggingConfig};
pub use single_flight::OnceMap;
