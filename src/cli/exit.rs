//! Semantic exit codes for the harness CLI.
//!
//! Exit codes follow common conventions and are in the valid range (0-125).
//! Codes 126-255 are reserved by shells for special purposes.

use crate::error::{FaultClass, HarnessError};

/// Semantic exit codes.
pub struct ExitCode;

impl ExitCode {
    /// Every test set verified.
    pub const SUCCESS: i32 = 0;

    /// Bad arguments, missing files, invalid configuration.
    pub const USER_ERROR: i32 = 1;

    /// Link failure, timeout, or malformed data.
    pub const RUNTIME_ERROR: i32 = 2;

    // Application-specific codes (10-125)

    /// The device violated the protocol.
    pub const TEST_FAILURE: i32 = 10;

    /// Exit code for a fault.
    #[must_use]
    pub const fn for_error(err: &HarnessError) -> i32 {
        match err.class() {
            class if class.is_protocol_violation() => Self::TEST_FAILURE,
            FaultClass::Config => Self::USER_ERROR,
            _ => Self::RUNTIME_ERROR,
        }
    }

    /// Exit code for the outcome of a run.
    #[must_use]
    pub const fn for_result<T>(result: &Result<T, HarnessError>) -> i32 {
        match result {
            Ok(_) => Self::SUCCESS,
            Err(err) => Self::for_error(err),
        }
    }

    /// Get human-readable description of an exit code.
    #[must_use]
    pub const fn description(code: i32) -> &'static str {
        match code {
            0 => "success",
            1 => "user error (invalid input/arguments)",
            2 => "runtime error",
            10 => "test failure",
            _ => "unknown",
        }
    }
}
