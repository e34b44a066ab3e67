use unitgraph::cli::{handle_make, handle_units, CliArgs, Commands};
use unitgraph::util::logging::{init_logging, parse_level, LoggingConfig};
use unitgraph::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("unitgraph v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Make(make_args) => handle_make(make_args).await,
        Commands::Units(units_args) => handle_units(units_args).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("UNITGRAPH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        parse_level(&level_str)
    };

    let use_json = env::var("UNITGRAPH_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    init_logging(LoggingConfig {
        level,
        use_json,
        ..Default::default()
    });
}
