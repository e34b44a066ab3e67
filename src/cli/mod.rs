pub mod commands;
pub mod handlers;

pub use commands::{CliArgs, Commands, MakeArgs, OutputFormatArg, UnitsArgs};
pub use handlers::{handle_make, handle_units};
