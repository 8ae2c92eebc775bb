//! Completion status reported to the host.
//!
//! The harness ends a run by publishing a single status word. Bit 0 is the
//! completion flag and is always set; the remaining bits carry the packed
//! failure code (see [`HarnessError::failure_code`]).
//!
//! ```text
//! success = 1
//! failure = (code << 1) | 1      code == 0 is replaced by 0xFF
//! ```

use std::fmt;
use std::io;
use std::path::Path;

use crate::error::HarnessError;

/// Status word published at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct StatusWord(u64);

impl StatusWord {
    /// Run completed and every response verified.
    pub const SUCCESS: Self = Self(1);

    /// Placeholder code used when a failure packs to zero.
    pub const FALLBACK_CODE: u64 = 0xFF;

    /// Status word for a failed run with the given failure code.
    #[must_use]
    pub const fn failure(code: u64) -> Self {
        let code = if code == 0 { Self::FALLBACK_CODE } else { code };
        Self((code << 1) | 1)
    }

    /// Status word for the outcome of a run.
    #[must_use]
    pub fn from_result<T>(result: &Result<T, HarnessError>) -> Self {
        match result {
            Ok(_) => Self::SUCCESS,
            Err(err) => Self::failure(err.failure_code()),
        }
    }

    /// Raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns `true` for [`StatusWord::SUCCESS`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }

    /// Packed failure code, or `None` on success.
    #[must_use]
    pub const fn failure_code(self) -> Option<u64> {
        if self.is_success() {
            None
        } else {
            Some(self.0 >> 1)
        }
    }

    /// Writes the word in decimal followed by a newline.
    pub fn write_to(self, path: &Path) -> io::Result<()> {
        std::fs::write(path, format!("{}\n", self.0))
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureCode;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn success_is_one() {
        init_test("success_is_one");
        let word = StatusWord::from_result::<()>(&Ok(()));
        crate::assert_with_log!(word.get() == 1, "success word", 1, word.get());
        crate::assert_with_log!(
            word.failure_code().is_none(),
            "no code",
            None::<u64>,
            word.failure_code()
        );
        crate::test_complete!("success_is_one");
    }

    #[test]
    fn failure_word_sets_completion_bit() {
        init_test("failure_word_sets_completion_bit");
        let err = HarnessError::Length {
            test_set: 3,
            expected: 1032,
            actual: 932,
        };
        let word = StatusWord::from_result::<()>(&Err(err));
        assert_eq!(word.get() & 1, 1);
        let code = word.failure_code().expect("failure");
        let unpacked = FailureCode::unpack(code);
        assert_eq!(unpacked.test_set, 3);
        assert_eq!(unpacked.class, 2);
        assert!(!word.is_success());
        crate::test_complete!("failure_word_sets_completion_bit");
    }

    #[test]
    fn zero_code_uses_fallback() {
        init_test("zero_code_uses_fallback");
        let word = StatusWord::failure(0);
        assert_eq!(word.get(), (0xFF << 1) | 1);
        assert!(!word.is_success());
        crate::test_complete!("zero_code_uses_fallback");
    }

    #[test]
    fn writes_decimal_to_file() {
        init_test("writes_decimal_to_file");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("status");
        StatusWord::failure(0x123).write_to(&path).expect("write");
        let text = std::fs::read_to_string(&path).expect("read");
        assert_eq!(text, "583\n");
        crate::test_complete!("writes_decimal_to_file");
    }
}
