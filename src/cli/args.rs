//! Common CLI argument handling.

use std::fmt;
use std::path::PathBuf;

use tracing::Level;

/// Output format for reports and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Plain text for terminals.
    #[default]
    Human,
    /// One JSON document.
    Json,
    /// Indented JSON.
    JsonPretty,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Human => "human",
            Self::Json => "json",
            Self::JsonPretty => "json-pretty",
        })
    }
}

/// Arguments shared by every subcommand.
#[derive(Clone, Debug, Default)]
pub struct CommonArgs {
    /// Output format selection.
    pub format: OutputFormat,

    /// Verbosity level (0 = normal, 1 = debug, 2+ = trace).
    pub verbosity: u8,

    /// Only report errors.
    pub quiet: bool,

    /// Configuration file path.
    pub config: Option<PathBuf>,

    /// File that receives the final status word.
    pub status_file: Option<PathBuf>,
}

impl CommonArgs {
    /// Create new common args with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum tracing level for the chosen verbosity.
    ///
    /// `fallback` is used at verbosity 0, typically parsed from
    /// `RDHARNESS_LOG`.
    #[must_use]
    pub fn log_level(&self, fallback: Option<Level>) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbosity {
            0 => fallback.unwrap_or(Level::INFO),
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub const fn with_verbosity(mut self, level: u8) -> Self {
        self.verbosity = level;
        self
    }

    /// Enable quiet mode.
    #[must_use]
    pub const fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

/// Parse output format from string.
///
/// # Errors
///
/// Returns an error message if the format is not recognized.
pub fn parse_output_format(s: &str) -> Result<OutputFormat, String> {
    match s.to_lowercase().as_str() {
        "human" | "text" | "plain" => Ok(OutputFormat::Human),
        "json" => Ok(OutputFormat::Json),
        "json-pretty" | "pretty" => Ok(OutputFormat::JsonPretty),
        other => Err(format!(
            "Unknown output format '{other}'. Valid formats: human, json, json-pretty"
        )),
    }
}

/// Parse a tracing level name (`error`, `warn`, `info`, `debug`, `trace`).
#[must_use]
pub fn parse_log_level(s: &str) -> Option<Level> {
    s.trim().parse().ok()
}
