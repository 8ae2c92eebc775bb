//! Command-line support: shared arguments, exit codes and structured errors.

pub mod args;
pub mod error;
pub mod exit;

pub use args::{CommonArgs, OutputFormat, parse_log_level, parse_output_format};
pub use error::{CliError, errors};
pub use exit::ExitCode;
