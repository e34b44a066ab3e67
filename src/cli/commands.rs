use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Containerized cross-repository dependency graph builder
#[derive(Parser, Debug)]
#[command(
    name = "unitgraph",
    about = "Containerized cross-repository dependency graph builder",
    version,
    long_about = "unitgraph scans a repository for source units, lists each unit's raw \
                  dependencies inside toolchain containers and resolves them to units in \
                  other repositories. Results are written to a per-commit build store and \
                  rebuilt incrementally."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Build the dependency graph of a repository",
        long_about = "Scans the repository, lists and resolves the dependencies of every unit \
                      and writes the results to the build store. Rules whose outputs are newer \
                      than their inputs are skipped.\n\n\
                      Examples:\n  \
                      unitgraph make\n  \
                      unitgraph make /path/to/repo --jobs 8\n  \
                      unitgraph make --commit 4f2a9c1"
    )]
    Make(MakeArgs),

    #[command(
        about = "List the source units of a repository",
        long_about = "Runs only the scan step and prints the discovered units.\n\n\
                      Examples:\n  \
                      unitgraph units\n  \
                      unitgraph units /path/to/repo --format json"
    )]
    Units(UnitsArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct MakeArgs {
    #[arg(
        value_name = "PATH",
        help = "Path to repository (defaults to current directory)"
    )]
    pub repository_path: Option<PathBuf>,

    #[arg(
        long,
        value_name = "COMMIT",
        help = "Commit id to store results under (defaults to HEAD)"
    )]
    pub commit: Option<String>,

    #[arg(
        short = 'j',
        long,
        value_name = "N",
        help = "Maximum number of rules running at once"
    )]
    pub jobs: Option<usize>,

    #[arg(
        long,
        value_name = "SECONDS",
        help = "Timeout for a single container command"
    )]
    pub timeout: Option<u64>,
}

#[derive(Parser, Debug, Clone)]
pub struct UnitsArgs {
    #[arg(
        value_name = "PATH",
        help = "Path to repository (defaults to current directory)"
    )]
    pub repository_path: Option<PathBuf>,

    #[arg(long, value_name = "COMMIT", help = "Commit id (defaults to HEAD)")]
    pub commit: Option<String>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Human,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_default_make_args() {
        let args = CliArgs::parse_from(["unitgraph", "make"]);
        match args.command {
            Commands::Make(make) => {
                assert!(make.repository_path.is_none());
                assert!(make.commit.is_none());
                assert!(make.jobs.is_none());
                assert!(make.timeout.is_none());
            }
            _ => panic!("Expected Make command"),
        }
    }

    #[test]
    fn test_make_with_options() {
        let args = CliArgs::parse_from([
            "unitgraph",
            "make",
            "/tmp/repo",
            "--commit",
            "abc123",
            "-j",
            "8",
            "--timeout",
            "120",
        ]);
        match args.command {
            Commands::Make(make) => {
                assert_eq!(make.repository_path, Some(PathBuf::from("/tmp/repo")));
                assert_eq!(make.commit.as_deref(), Some("abc123"));
                assert_eq!(make.jobs, Some(8));
                assert_eq!(make.timeout, Some(120));
            }
            _ => panic!("Expected Make command"),
        }
    }

    #[test]
    fn test_units_format() {
        let args = CliArgs::parse_from(["unitgraph", "units", "--format", "json"]);
        match args.command {
            Commands::Units(units) => assert_eq!(units.format, OutputFormatArg::Json),
            _ => panic!("Expected Units command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let args = CliArgs::parse_from(["unitgraph", "-v", "make"]);
        assert!(args.verbose);
        assert!(!args.quiet);

        let args = CliArgs::parse_from(["unitgraph", "--log-level", "debug", "units"]);
        assert_eq!(args.log_level.as_deref(), Some("debug"));

        assert!(CliArgs::try_parse_from(["unitgraph", "-v", "-q", "make"]).is_err());
    }
}
