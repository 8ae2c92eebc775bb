//! Structured error messages for the CLI.
//!
//! Follows RFC 9457 (Problem Details) style for machine-readable errors
//! with human-friendly formatting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::exit::ExitCode;
use crate::error::HarnessError;
use crate::status::StatusWord;

/// Structured error following RFC 9457 (Problem Details) style.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliError {
    /// Error type identifier (machine-readable).
    #[serde(rename = "type")]
    pub error_type: String,

    /// Short human-readable title.
    pub title: String,

    /// Detailed explanation.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,

    /// Suggested action for recovery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,

    /// Additional context (varies by error type).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,

    /// Exit code for this error.
    pub exit_code: i32,
}

impl CliError {
    /// Create a new CLI error.
    #[must_use]
    pub fn new(error_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            title: title.into(),
            detail: String::new(),
            suggestion: None,
            context: BTreeMap::new(),
            exit_code: ExitCode::RUNTIME_ERROR,
        }
    }

    /// Add detailed explanation.
    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Add a suggested recovery action.
    #[must_use]
    pub fn suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add context field.
    #[must_use]
    pub fn context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Set exit code.
    #[must_use]
    pub const fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Format for human output.
    #[must_use]
    pub fn human_format(&self) -> String {
        use std::fmt::Write;

        let mut out = format!("Error: {}\n", self.title);
        if !self.detail.is_empty() {
            out.push_str(&self.detail);
            out.push('\n');
        }
        if let Some(suggestion) = &self.suggestion {
            let _ = writeln!(out, "\nSuggestion: {suggestion}");
        }
        if !self.context.is_empty() {
            out.push_str("\nContext:\n");
            for (k, v) in &self.context {
                let _ = writeln!(out, "  {k}: {v}");
            }
        }
        out
    }

    /// Format as JSON.
    #[must_use]
    pub fn json_format(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.title.clone())
    }

    /// Format as pretty JSON.
    #[must_use]
    pub fn json_pretty_format(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.title.clone())
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_type, self.title)
    }
}

impl std::error::Error for CliError {}

impl From<&HarnessError> for CliError {
    fn from(err: &HarnessError) -> Self {
        let class = err.class();
        let code = err.failure_code();
        let mut out = Self::new(class.name(), class.to_string())
            .detail(err.to_string())
            .context("phase", err.phase())
            .context("failure_code", format!("{code:#x}"))
            .context("status_word", StatusWord::failure(code).to_string())
            .exit_code(ExitCode::for_error(err));
        if let Some(set) = err.test_set() {
            out = out.context("test_set", set);
        }
        if let Some(hint) = hint_for(err) {
            out = out.suggestion(hint);
        }
        out
    }
}

fn hint_for(err: &HarnessError) -> Option<&'static str> {
    match err {
        HarnessError::ReceiveTimeout { .. } => {
            Some("Check that the device is powered and reachable, or raise --timeout-ms")
        }
        HarnessError::UnknownLevel { .. } => {
            Some("If the device reports stimulus level + 1, set run.response_level_offset to 1")
        }
        HarnessError::Config(_) => Some("Fix the configuration file or RDHARNESS_* variables"),
        _ => None,
    }
}

/// Standard error constructors.
pub mod errors {
    use super::{CliError, ExitCode};

    /// Invalid argument error.
    #[must_use]
    pub fn invalid_argument(arg: &str, reason: &str) -> CliError {
        CliError::new("invalid_argument", format!("Invalid argument: {arg}"))
            .detail(reason)
            .exit_code(ExitCode::USER_ERROR)
    }

    /// Transport could not be opened.
    #[must_use]
    pub fn connect_failed(target: &str, reason: &str) -> CliError {
        CliError::new("connect_failed", format!("Cannot open transport to {target}"))
            .detail(reason)
            .context("target", target)
            .suggestion("Check --bind and --target addresses")
            .exit_code(ExitCode::RUNTIME_ERROR)
    }

    /// Output file could not be written.
    #[must_use]
    pub fn write_failed(path: &str, reason: &str) -> CliError {
        CliError::new("write_failed", "Failed to write output file")
            .detail(reason)
            .context("path", path)
            .exit_code(ExitCode::USER_ERROR)
    }
}
