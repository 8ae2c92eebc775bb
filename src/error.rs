//! Error types for the verification harness.
//!
//! Every fault is fatal to the run: the harness never retries and never
//! continues with a partial result, because a collective engine either
//! reproduces the oracle for every level or it is broken.
//!
//! # Fault classes
//!
//! - **Transport**: the link failed or returned an empty frame
//! - **Timeout**: no frame arrived within the configured receive timeout
//! - **Length**: a frame of the wrong size arrived
//! - **Duplicate**: a level was reported twice within one test set
//! - **UnknownLevel**: a frame reported a level outside the test set
//! - **DataMismatch**: a frame differs from the expected frame
//! - **Malformed**: the codec was handed a buffer of the wrong size
//!
//! # Failure codes
//!
//! [`HarnessError::failure_code`] packs class, phase and test-set index into
//! one integer so a host that only sees the status word can still localize
//! the failure:
//!
//! ```text
//! code = (test_set << 8) | (phase << 4) | class
//! ```

use core::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::packet::{Mismatch, PacketError};
use crate::transport::TransportError;

/// Protocol phase in which a fault was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Before the first test set (device query, configuration).
    Setup,
    /// Transmitting stimuli.
    Sending,
    /// Collecting and verifying responses.
    Receiving,
}

impl Phase {
    /// Numeric phase tag used in failure codes.
    #[must_use]
    pub const fn code(self) -> u64 {
        match self {
            Self::Setup => 0,
            Self::Sending => 1,
            Self::Receiving => 2,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Setup => "setup",
            Self::Sending => "sending",
            Self::Receiving => "receiving",
        })
    }
}

/// Fault classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultClass {
    /// Link failure or empty frame.
    Transport,
    /// Frame length differs from the fixed frame length.
    Length,
    /// Level reported twice.
    Duplicate,
    /// Frame contents differ from the oracle.
    DataMismatch,
    /// Codec was given a buffer of the wrong size.
    Malformed,
    /// Receive timed out.
    Timeout,
    /// Reported level is not part of the test set.
    UnknownLevel,
    /// Invalid configuration.
    Config,
}

impl FaultClass {
    /// Numeric class tag used in failure codes. Never zero.
    #[must_use]
    pub const fn code(self) -> u64 {
        match self {
            Self::Transport => 1,
            Self::Length => 2,
            Self::Duplicate => 3,
            Self::DataMismatch => 4,
            Self::Malformed => 5,
            Self::Timeout => 6,
            Self::UnknownLevel => 7,
            Self::Config => 8,
        }
    }

    /// Stable snake_case identifier.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Length => "length",
            Self::Duplicate => "duplicate",
            Self::DataMismatch => "data_mismatch",
            Self::Malformed => "malformed",
            Self::Timeout => "timeout",
            Self::UnknownLevel => "unknown_level",
            Self::Config => "config",
        }
    }

    /// Returns `true` when the device, not the link or the operator, is at
    /// fault.
    #[must_use]
    pub const fn is_protocol_violation(self) -> bool {
        matches!(
            self,
            Self::Length | Self::Duplicate | Self::DataMismatch | Self::UnknownLevel
        )
    }
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transport => "transport fault",
            Self::Length => "length fault",
            Self::Duplicate => "duplicate response fault",
            Self::DataMismatch => "data mismatch fault",
            Self::Malformed => "malformed packet",
            Self::Timeout => "receive timeout",
            Self::UnknownLevel => "unknown level fault",
            Self::Config => "configuration error",
        })
    }
}

/// A fault that aborts the run.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The transport failed or delivered an empty frame.
    #[error("transport fault in test set {test_set} ({phase}): {detail}")]
    Transport {
        /// Test set being processed.
        test_set: u32,
        /// Phase of the fault.
        phase: Phase,
        /// Description of the failure.
        detail: String,
        /// Underlying transport error, if any.
        #[source]
        source: Option<TransportError>,
    },

    /// No frame arrived within the configured timeout.
    #[error(
        "receive timeout in test set {test_set}: {received} of {expected} responses verified"
    )]
    ReceiveTimeout {
        /// Test set being processed.
        test_set: u32,
        /// Responses verified before the timeout.
        received: usize,
        /// Responses the test set requires.
        expected: usize,
    },

    /// Frame length differs from the fixed frame length.
    #[error("length fault in test set {test_set}: expected {expected} bytes, got {actual}")]
    Length {
        /// Test set being processed.
        test_set: u32,
        /// Fixed frame length.
        expected: usize,
        /// Received length.
        actual: usize,
    },

    /// A level was reported twice.
    #[error("duplicate response in test set {test_set}: level {level} already verified")]
    DuplicateResponse {
        /// Test set being processed.
        test_set: u32,
        /// Level field of the repeated frame.
        level: u8,
    },

    /// The reported level does not belong to the test set.
    #[error("unknown level {level} in test set {test_set} (valid response levels {first}..={last})")]
    UnknownLevel {
        /// Test set being processed.
        test_set: u32,
        /// Level field of the frame.
        level: u8,
        /// Lowest valid response level.
        first: u8,
        /// Highest valid response level.
        last: u8,
    },

    /// Frame contents differ from the oracle.
    #[error("data mismatch in test set {test_set}, level {level}: {mismatch}")]
    DataMismatch {
        /// Test set being processed.
        test_set: u32,
        /// Level field of the frame.
        level: u8,
        /// First differing byte.
        mismatch: Mismatch,
    },

    /// A buffer of the wrong size reached the codec.
    #[error("malformed packet in test set {test_set} ({phase}): {source}")]
    Malformed {
        /// Test set being processed.
        test_set: u32,
        /// Phase of the fault.
        phase: Phase,
        /// Codec error.
        #[source]
        source: PacketError,
    },

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl HarnessError {
    /// Builds a transport fault from a transport error.
    #[must_use]
    pub fn transport(test_set: u32, phase: Phase, source: TransportError) -> Self {
        Self::Transport {
            test_set,
            phase,
            detail: source.to_string(),
            source: Some(source),
        }
    }

    /// Fault classification.
    #[must_use]
    pub const fn class(&self) -> FaultClass {
        match self {
            Self::Transport { .. } => FaultClass::Transport,
            Self::ReceiveTimeout { .. } => FaultClass::Timeout,
            Self::Length { .. } => FaultClass::Length,
            Self::DuplicateResponse { .. } => FaultClass::Duplicate,
            Self::UnknownLevel { .. } => FaultClass::UnknownLevel,
            Self::DataMismatch { .. } => FaultClass::DataMismatch,
            Self::Malformed { .. } => FaultClass::Malformed,
            Self::Config(_) => FaultClass::Config,
        }
    }

    /// Phase in which the fault was raised.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Transport { phase, .. } | Self::Malformed { phase, .. } => *phase,
            Self::ReceiveTimeout { .. }
            | Self::Length { .. }
            | Self::DuplicateResponse { .. }
            | Self::UnknownLevel { .. }
            | Self::DataMismatch { .. } => Phase::Receiving,
            Self::Config(_) => Phase::Setup,
        }
    }

    /// Test set in which the fault was raised, if any.
    #[must_use]
    pub const fn test_set(&self) -> Option<u32> {
        match self {
            Self::Transport { test_set, .. }
            | Self::ReceiveTimeout { test_set, .. }
            | Self::Length { test_set, .. }
            | Self::DuplicateResponse { test_set, .. }
            | Self::UnknownLevel { test_set, .. }
            | Self::DataMismatch { test_set, .. }
            | Self::Malformed { test_set, .. } => Some(*test_set),
            Self::Config(_) => None,
        }
    }

    /// Non-zero failure code: `(test_set << 8) | (phase << 4) | class`.
    #[must_use]
    pub const fn failure_code(&self) -> u64 {
        let set = match self.test_set() {
            Some(set) => set as u64,
            None => 0,
        };
        (set << 8) | (self.phase().code() << 4) | self.class().code()
    }
}

/// Unpacked form of a failure code, for hosts reading a status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureCode {
    /// Test-set index.
    pub test_set: u64,
    /// Phase tag.
    pub phase: u64,
    /// Class tag.
    pub class: u64,
}

impl FailureCode {
    /// Splits a packed failure code.
    #[must_use]
    pub const fn unpack(code: u64) -> Self {
        Self {
            test_set: code >> 8,
            phase: (code >> 4) & 0xF,
            class: code & 0xF,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{MetaField, MismatchRegion};

    #[test]
    fn class_codes_are_distinct_and_non_zero() {
        let classes = [
            FaultClass::Transport,
            FaultClass::Length,
            FaultClass::Duplicate,
            FaultClass::DataMismatch,
            FaultClass::Malformed,
            FaultClass::Timeout,
            FaultClass::UnknownLevel,
            FaultClass::Config,
        ];
        let codes: std::collections::HashSet<u64> = classes.iter().map(|c| c.code()).collect();
        assert_eq!(codes.len(), classes.len());
        assert!(!codes.contains(&0));
        assert!(codes.iter().all(|c| *c < 16));
    }

    #[test]
    fn failure_code_packs_set_phase_class() {
        let err = HarnessError::DuplicateResponse {
            test_set: 5,
            level: 2,
        };
        let code = err.failure_code();
        assert_eq!(code, (5 << 8) | (2 << 4) | 3);
        let unpacked = FailureCode::unpack(code);
        assert_eq!(unpacked.test_set, 5);
        assert_eq!(unpacked.phase, Phase::Receiving.code());
        assert_eq!(unpacked.class, FaultClass::Duplicate.code());
    }

    #[test]
    fn send_fault_reports_sending_phase() {
        let err = HarnessError::transport(
            1,
            Phase::Sending,
            TransportError::SendFailed {
                reason: "link down".into(),
            },
        );
        assert_eq!(err.phase(), Phase::Sending);
        assert_eq!(err.class(), FaultClass::Transport);
        assert!(err.to_string().contains("link down"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn mismatch_display_includes_offset() {
        let err = HarnessError::DataMismatch {
            test_set: 0,
            level: 1,
            mismatch: Mismatch {
                offset: 7,
                expected: 1,
                actual: 2,
                region: MismatchRegion::Metadata {
                    field: MetaField::Level,
                },
            },
        };
        let text = err.to_string();
        assert!(text.contains("byte 7"), "{text}");
        assert!(text.contains("metadata level"), "{text}");
        assert!(err.class().is_protocol_violation());
    }

    #[test]
    fn config_errors_have_no_test_set() {
        let err = HarnessError::from(ConfigError::InvalidElementCount);
        assert_eq!(err.test_set(), None);
        assert_eq!(err.phase(), Phase::Setup);
        assert_eq!(err.failure_code(), FaultClass::Config.code());
    }
}
