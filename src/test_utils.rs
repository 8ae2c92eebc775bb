//! Shared helpers for unit tests.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a test-writer tracing subscriber once per process.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// Logs the start of a test.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(test = $name, "=== TEST START ===");
    };
}

/// Logs a named section within a test.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = $name, "--- {} ---", $name);
    };
}

/// Asserts `cond`, logging expected and actual values on failure.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        if !$cond {
            tracing::error!(
                message = $msg,
                expected = ?$expected,
                actual = ?$actual,
                "Assertion failed"
            );
        }
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// Logs the end of a test.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = $name, "=== TEST COMPLETE ===");
    };
}
