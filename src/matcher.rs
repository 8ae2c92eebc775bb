//! Send and receive phases of a test set.
//!
//! A round runs in two strict phases:
//!
//! 1. **Sending**: every stimulus is written to the transport in the round's
//!    scheduled order. Sends are write-only; nothing is read back.
//! 2. **Receiving**: frames are read until every level has been verified.
//!    Frames may arrive in any order; each is paired with its level through
//!    the level field, never through its arrival position.
//!
//! Verification of one response, in order:
//!
//! - empty frame → transport fault
//! - wrong length → length fault (before any byte is compared)
//! - level outside the round → unknown-level fault
//! - level already verified → duplicate fault
//! - any byte differing from the expected frame → data-mismatch fault
//!
//! The first fault ends the round and the run.

use std::time::Duration;

use crate::error::{HarnessError, Phase};
use crate::packet::{first_mismatch, hex_dump};
use crate::test_set::TestSet;
use crate::transport::{Transport, TransportError};

/// Set of level indices, one bit per possible 8-bit level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelSet {
    words: [u64; 4],
}

impl LevelSet {
    /// Empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { words: [0; 4] }
    }

    /// Returns `true` if `level` is present.
    #[must_use]
    pub const fn contains(&self, level: u8) -> bool {
        let (word, bit) = Self::slot(level);
        self.words[word] & bit != 0
    }

    /// Inserts `level`. Returns `false` if it was already present.
    pub fn insert(&mut self, level: u8) -> bool {
        let (word, bit) = Self::slot(level);
        let fresh = self.words[word] & bit == 0;
        self.words[word] |= bit;
        fresh
    }

    /// Number of levels present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if no level is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    const fn slot(level: u8) -> (usize, u64) {
        ((level >> 6) as usize, 1_u64 << (level & 63))
    }
}

/// Progress of the receive phase of one round.
#[derive(Debug, Clone, Default)]
pub struct ReceptionState {
    observed: LevelSet,
    received: usize,
    arrival: Vec<u8>,
}

impl ReceptionState {
    /// Levels verified so far (zero-based indices).
    #[must_use]
    pub const fn observed(&self) -> &LevelSet {
        &self.observed
    }

    /// Number of verified responses.
    #[must_use]
    pub const fn received(&self) -> usize {
        self.received
    }

    /// Level indices in the order their responses arrived.
    #[must_use]
    pub fn arrival_order(&self) -> &[u8] {
        &self.arrival
    }

    /// Records a verified level. Returns `false` if it was already recorded.
    fn record(&mut self, index: u8) -> bool {
        if !self.observed.insert(index) {
            return false;
        }
        self.received += 1;
        self.arrival.push(index);
        true
    }
}

/// A verified response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    /// Level field as reported by the device.
    pub reported_level: u8,
    /// Zero-based level index the response was paired with.
    pub index: usize,
}

/// Verifies the responses of one round against its expected chain.
#[derive(Debug)]
pub struct ResponseMatcher<'a> {
    set: &'a TestSet,
    level_offset: u8,
    state: ReceptionState,
    dump_packets: bool,
}

impl<'a> ResponseMatcher<'a> {
    /// Creates a matcher for `set`.
    ///
    /// `level_offset` is subtracted from each reported level to find the
    /// level index it belongs to.
    #[must_use]
    pub fn new(set: &'a TestSet, level_offset: u8) -> Self {
        Self {
            set,
            level_offset,
            state: ReceptionState::default(),
            dump_packets: false,
        }
    }

    /// Enables trace-level hex dumps of expected and actual frames.
    #[must_use]
    pub const fn dump_packets(mut self, enabled: bool) -> Self {
        self.dump_packets = enabled;
        self
    }

    /// Current reception state.
    #[must_use]
    pub const fn state(&self) -> &ReceptionState {
        &self.state
    }

    /// Consumes the matcher, returning its final state.
    #[must_use]
    pub fn into_state(self) -> ReceptionState {
        self.state
    }

    /// Returns `true` once every level has been verified.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.observed.len() == self.set.level_count()
    }

    /// Verifies one received frame.
    pub fn accept(&mut self, frame: &[u8]) -> Result<Accepted, HarnessError> {
        let test_set = self.set.index();
        let layout = self.set.layout();

        if frame.is_empty() {
            return Err(HarnessError::Transport {
                test_set,
                phase: Phase::Receiving,
                detail: "receive returned a non-positive length".to_string(),
                source: None,
            });
        }

        if frame.len() != layout.frame_len() {
            tracing::error!(
                test_set,
                expected = layout.frame_len(),
                actual = frame.len(),
                "response length mismatch"
            );
            return Err(HarnessError::Length {
                test_set,
                expected: layout.frame_len(),
                actual: frame.len(),
            });
        }

        let packet = layout
            .decode(frame)
            .map_err(|source| HarnessError::Malformed {
                test_set,
                phase: Phase::Receiving,
                source,
            })?;
        let reported_level = packet.meta.level;
        let index = self.resolve(reported_level)?;

        if self.state.observed.contains(index) {
            tracing::error!(test_set, level = reported_level, "duplicate response");
            return Err(HarnessError::DuplicateResponse {
                test_set,
                level: reported_level,
            });
        }

        let expected = self
            .set
            .expected_frame(reported_level, usize::from(index))
            .map_err(|source| HarnessError::Malformed {
                test_set,
                phase: Phase::Receiving,
                source,
            })?;

        if self.dump_packets {
            tracing::trace!(
                test_set,
                level = reported_level,
                "expected frame:\n{}",
                hex_dump(&expected)
            );
            tracing::trace!(
                test_set,
                level = reported_level,
                "actual frame:\n{}",
                hex_dump(frame)
            );
        }

        if let Some(mismatch) = first_mismatch(&expected, frame) {
            tracing::error!(
                test_set,
                level = reported_level,
                offset = mismatch.offset,
                expected = format_args!("0x{:02x}", mismatch.expected),
                actual = format_args!("0x{:02x}", mismatch.actual),
                "response data mismatch: {mismatch}"
            );
            return Err(HarnessError::DataMismatch {
                test_set,
                level: reported_level,
                mismatch,
            });
        }

        self.state.record(index);
        tracing::debug!(
            test_set,
            level = reported_level,
            index,
            verified = self.state.received,
            "response verified"
        );
        Ok(Accepted {
            reported_level,
            index: usize::from(index),
        })
    }

    fn resolve(&self, reported_level: u8) -> Result<u8, HarnessError> {
        let count = self.set.level_count();
        match reported_level.checked_sub(self.level_offset) {
            Some(index) if usize::from(index) < count => Ok(index),
            _ => {
                let first = self.level_offset;
                #[allow(clippy::cast_possible_truncation)]
                let last = first.saturating_add((count - 1) as u8);
                tracing::error!(
                    test_set = self.set.index(),
                    level = reported_level,
                    "response reports a level outside the test set"
                );
                Err(HarnessError::UnknownLevel {
                    test_set: self.set.index(),
                    level: reported_level,
                    first,
                    last,
                })
            }
        }
    }
}

/// Sending phase: writes every stimulus in the round's scheduled order.
pub fn send_stimuli<T: Transport + ?Sized>(
    transport: &mut T,
    set: &TestSet,
    dump_packets: bool,
) -> Result<(), HarnessError> {
    for &level in set.order() {
        let frame = set
            .stimulus_frame(level)
            .map_err(|source| HarnessError::Malformed {
                test_set: set.index(),
                phase: Phase::Sending,
                source,
            })?;
        if dump_packets {
            tracing::trace!(test_set = set.index(), level, "stimulus frame:\n{}", hex_dump(&frame));
        }
        transport
            .send(&frame)
            .map_err(|err| HarnessError::transport(set.index(), Phase::Sending, err))?;
        tracing::debug!(test_set = set.index(), level, "stimulus sent");
    }
    Ok(())
}

/// Receiving phase: reads and verifies responses until every level is
/// accounted for.
///
/// Frames are read into a buffer twice the frame length so oversized frames
/// surface as length faults rather than being silently truncated.
pub fn collect_responses<T: Transport + ?Sized>(
    transport: &mut T,
    set: &TestSet,
    level_offset: u8,
    timeout: Option<Duration>,
    dump_packets: bool,
) -> Result<ReceptionState, HarnessError> {
    let mut matcher = ResponseMatcher::new(set, level_offset).dump_packets(dump_packets);
    let mut buf = vec![0_u8; set.layout().frame_len() * 2];

    while !matcher.is_complete() {
        buf.fill(0);
        let len = match transport.receive(&mut buf, timeout) {
            Ok(len) => len,
            Err(TransportError::Timeout) => {
                tracing::error!(
                    test_set = set.index(),
                    verified = matcher.state().received(),
                    "timed out waiting for response"
                );
                return Err(HarnessError::ReceiveTimeout {
                    test_set: set.index(),
                    received: matcher.state().received(),
                    expected: set.level_count(),
                });
            }
            Err(err) => {
                return Err(HarnessError::transport(set.index(), Phase::Receiving, err));
            }
        };
        let frame = buf.get(..len).ok_or_else(|| HarnessError::Transport {
            test_set: set.index(),
            phase: Phase::Receiving,
            detail: format!("transport reported {len} bytes into a {}-byte buffer", buf.len()),
            source: None,
        })?;
        matcher.accept(frame)?;
    }

    Ok(matcher.into_state())
}
