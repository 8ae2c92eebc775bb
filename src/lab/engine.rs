//! Deterministic model of a recursive-doubling offload device.
//!
//! [`SimulatedEngine`] stands in for the device behind a [`Transport`] so the
//! harness can be exercised without hardware. It is store-and-forward: frames
//! are staged per level until the whole round (`max_level + 1` frames) has
//! arrived, then every response is produced at once and queued in a random
//! permutation.
//!
//! # Fault Types
//!
//! - **Duplicate**: a level's response is emitted twice at the head of the
//!   round.
//! - **Corrupt**: one byte of a level's response is flipped.
//! - **Truncate**: a level's response loses trailing bytes.
//! - **Drop**: a level's response is never emitted.
//! - **Empty**: a level's response is replaced by a zero-length frame.
//! - **Reverse accumulation**: the running sum is folded from the top level
//!   down instead of from level 0 up.
//!
//! # Determinism
//!
//! The arrival permutation comes from a seeded [`DetRng`]. Same seed, same
//! stimuli → same response sequence.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;

use crate::packet::{BYTES_PER_ELEMENT, METADATA_LEN, PacketLayout, PacketMeta, Payload};
use crate::transport::{DeviceId, Transport, TransportError};
use crate::util::DetRng;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Byte corruption applied to one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Corruption {
    /// Level whose response is corrupted.
    pub level: u8,
    /// Byte offset within the frame.
    pub offset: usize,
    /// Mask XOR-ed into the byte. Zero is promoted to `0xFF`.
    pub mask: u8,
}

/// Faults injected into the engine's responses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineFaults {
    /// Emit this level's response twice.
    pub duplicate_level: Option<u8>,
    /// Flip a byte of one response.
    pub corrupt: Option<Corruption>,
    /// Drop `bytes` trailing bytes from one level's response.
    pub truncate: Option<(u8, usize)>,
    /// Never respond for this level.
    pub drop_level: Option<u8>,
    /// Replace this level's response with an empty frame.
    pub empty_level: Option<u8>,
    /// Fold the running sum from the highest level down.
    pub reverse_accumulate: bool,
    /// Restrict faults to this round (zero-based). `None` affects every round.
    pub round: Option<u64>,
}

impl EngineFaults {
    /// No faults.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Duplicate the response for `level`.
    #[must_use]
    pub const fn with_duplicate(mut self, level: u8) -> Self {
        self.duplicate_level = Some(level);
        self
    }

    /// XOR `mask` into byte `offset` of the response for `level`.
    #[must_use]
    pub const fn with_corruption(mut self, level: u8, offset: usize, mask: u8) -> Self {
        self.corrupt = Some(Corruption {
            level,
            offset,
            mask,
        });
        self
    }

    /// Shorten the response for `level` by `bytes`.
    #[must_use]
    pub const fn with_truncation(mut self, level: u8, bytes: usize) -> Self {
        self.truncate = Some((level, bytes));
        self
    }

    /// Never emit the response for `level`.
    #[must_use]
    pub const fn with_drop(mut self, level: u8) -> Self {
        self.drop_level = Some(level);
        self
    }

    /// Emit an empty frame in place of the response for `level`.
    #[must_use]
    pub const fn with_empty(mut self, level: u8) -> Self {
        self.empty_level = Some(level);
        self
    }

    /// Accumulate in the wrong direction.
    #[must_use]
    pub const fn with_reverse_accumulation(mut self) -> Self {
        self.reverse_accumulate = true;
        self
    }

    /// Only inject faults in round `round`.
    #[must_use]
    pub const fn in_round(mut self, round: u64) -> Self {
        self.round = Some(round);
        self
    }

    /// Returns `true` if any fault is configured.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.duplicate_level.is_some()
            || self.corrupt.is_some()
            || self.truncate.is_some()
            || self.drop_level.is_some()
            || self.empty_level.is_some()
            || self.reverse_accumulate
    }
}

/// Configuration for [`SimulatedEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Seed for the arrival permutation.
    pub seed: u64,
    /// Identifier reported by `device_identifier`.
    pub device_id: DeviceId,
    /// Added to the level field of every response.
    pub level_offset: u8,
    /// Shuffle responses. When `false` they leave in level order.
    pub reorder: bool,
    /// Injected faults.
    pub faults: EngineFaults,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED_0FF1_0AD0,
            device_id: DeviceId::new(0x0200_0000_0001),
            level_offset: 0,
            reorder: true,
            faults: EngineFaults::none(),
        }
    }
}

impl EngineConfig {
    /// Config with the given arrival seed and no faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Sets the response level offset.
    #[must_use]
    pub const fn with_level_offset(mut self, offset: u8) -> Self {
        self.level_offset = offset;
        self
    }

    /// Enables or disables arrival shuffling.
    #[must_use]
    pub const fn with_reorder(mut self, reorder: bool) -> Self {
        self.reorder = reorder;
        self
    }

    /// Sets the injected faults.
    #[must_use]
    pub fn with_faults(mut self, faults: EngineFaults) -> Self {
        self.faults = faults;
        self
    }

    /// Sets the device identifier.
    #[must_use]
    pub const fn with_device_id(mut self, device_id: DeviceId) -> Self {
        self.device_id = device_id;
        self
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Counters maintained by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Stimulus frames accepted.
    pub frames_received: u64,
    /// Response frames queued.
    pub frames_emitted: u64,
    /// Completed rounds.
    pub rounds_completed: u64,
    /// Faults applied.
    pub faults_injected: u64,
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EngineStats {{ received: {}, emitted: {}, rounds: {}, faults: {} }}",
            self.frames_received, self.frames_emitted, self.rounds_completed, self.faults_injected,
        )
    }
}

// ---------------------------------------------------------------------------
// SimulatedEngine
// ---------------------------------------------------------------------------

/// In-process stand-in for the offload device.
#[derive(Debug)]
pub struct SimulatedEngine {
    config: EngineConfig,
    rng: DetRng,
    staged: BTreeMap<u8, (PacketMeta, Payload)>,
    outbox: VecDeque<Vec<u8>>,
    stats: EngineStats,
}

impl SimulatedEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let rng = DetRng::new(config.seed);
        Self {
            config,
            rng,
            staged: BTreeMap::new(),
            outbox: VecDeque::new(),
            stats: EngineStats::default(),
        }
    }

    /// Snapshot of the engine counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.stats.clone()
    }

    /// Number of responses waiting to be received.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.outbox.len()
    }

    fn stage(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if frame.len() < METADATA_LEN || (frame.len() - METADATA_LEN) % BYTES_PER_ELEMENT != 0 {
            return Err(TransportError::SendFailed {
                reason: format!("engine cannot parse a {}-byte frame", frame.len()),
            });
        }
        let layout = PacketLayout::new((frame.len() - METADATA_LEN) / BYTES_PER_ELEMENT);
        let packet = layout
            .decode(frame)
            .map_err(|err| TransportError::SendFailed {
                reason: err.to_string(),
            })?;

        let level = packet.meta.level;
        if level > packet.meta.max_level {
            return Err(TransportError::SendFailed {
                reason: format!(
                    "level {level} exceeds max level {}",
                    packet.meta.max_level
                ),
            });
        }
        if self.staged.contains_key(&level) {
            return Err(TransportError::SendFailed {
                reason: format!("level {level} already staged for this round"),
            });
        }

        self.staged.insert(level, (packet.meta, packet.payload));
        self.stats.frames_received += 1;

        if self.staged.len() == usize::from(packet.meta.max_level) + 1 {
            self.complete_round(layout);
        }
        Ok(())
    }

    fn complete_round(&mut self, layout: PacketLayout) {
        let round = self.stats.rounds_completed;
        let staged = std::mem::take(&mut self.staged);
        let faults_active =
            self.config.faults.is_enabled() && self.config.faults.round.is_none_or(|r| r == round);
        let reverse = faults_active && self.config.faults.reverse_accumulate;

        let mut levels: Vec<(PacketMeta, Payload)> = staged.into_values().collect();
        if reverse {
            levels.reverse();
        }

        let mut running: Option<Payload> = None;
        let mut responses: Vec<(u8, Vec<u8>)> = Vec::with_capacity(levels.len());
        for (meta, input) in levels {
            let acc: Payload = match &running {
                None => input,
                Some(prev) => input
                    .iter()
                    .zip(prev)
                    .map(|(x, a)| x.wrapping_add(*a))
                    .collect(),
            };
            let out_meta = meta.with_level(meta.level.wrapping_add(self.config.level_offset));
            match layout.encode(&out_meta, &acc) {
                Ok(frame) => responses.push((meta.level, frame)),
                Err(err) => tracing::warn!(%err, "engine failed to encode response"),
            }
            running = Some(acc);
        }

        if faults_active {
            responses = self.apply_faults(responses);
        }
        if self.config.reorder {
            self.rng.shuffle(&mut responses);
        }
        if faults_active {
            self.inject_duplicate(&mut responses);
        }

        self.stats.rounds_completed += 1;
        self.stats.frames_emitted += responses.len() as u64;
        tracing::debug!(
            round,
            responses = responses.len(),
            order = ?responses.iter().map(|(l, _)| *l).collect::<Vec<_>>(),
            "engine round complete"
        );
        self.outbox.extend(responses.into_iter().map(|(_, frame)| frame));
    }

    fn apply_faults(&mut self, responses: Vec<(u8, Vec<u8>)>) -> Vec<(u8, Vec<u8>)> {
        let faults = self.config.faults.clone();
        if faults.reverse_accumulate {
            self.stats.faults_injected += 1;
        }
        let mut out = Vec::with_capacity(responses.len() + 1);
        for (level, mut frame) in responses {
            if faults.drop_level == Some(level) {
                self.stats.faults_injected += 1;
                continue;
            }
            if faults.empty_level == Some(level) {
                self.stats.faults_injected += 1;
                frame.clear();
            }
            if let Some(c) = faults.corrupt.filter(|c| c.level == level) {
                if let Some(byte) = frame.get_mut(c.offset) {
                    *byte ^= if c.mask == 0 { 0xFF } else { c.mask };
                    self.stats.faults_injected += 1;
                }
            }
            if let Some((_, bytes)) = faults.truncate.filter(|(l, _)| *l == level) {
                let keep = frame.len().saturating_sub(bytes);
                frame.truncate(keep);
                self.stats.faults_injected += 1;
            }
            out.push((level, frame));
        }
        out
    }

    /// Moves the duplicated level's response to the front of the round,
    /// followed by its copy, so both arrive before the round can complete.
    fn inject_duplicate(&mut self, responses: &mut Vec<(u8, Vec<u8>)>) {
        let Some(level) = self.config.faults.duplicate_level else {
            return;
        };
        if let Some(pos) = responses.iter().position(|(l, _)| *l == level) {
            let original = responses.remove(pos);
            responses.insert(0, original.clone());
            responses.insert(1, original);
            self.stats.faults_injected += 1;
        }
    }
}

impl Transport for SimulatedEngine {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.stage(frame)
    }

    fn receive(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        let Some(frame) = self.outbox.pop_front() else {
            // Nothing will ever arrive: a real device would stall forever.
            if timeout.is_none() {
                tracing::warn!("engine has no pending responses; reporting timeout instead of blocking");
            }
            return Err(TransportError::Timeout);
        };
        if frame.len() > buf.len() {
            return Err(TransportError::Oversized {
                len: frame.len(),
                capacity: buf.len(),
            });
        }
        buf[..frame.len()].copy_from_slice(&frame);
        Ok(frame.len())
    }

    fn device_identifier(&mut self) -> Result<DeviceId, TransportError> {
        Ok(self.config.device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::compute_chain;

    fn layout() -> PacketLayout {
        PacketLayout::new(2)
    }

    fn meta(level: u8) -> PacketMeta {
        PacketMeta {
            collective_id: 0x1234,
            collective_type: 1,
            op_code: 5,
            max_level: 2,
            level,
        }
    }

    fn inputs() -> Vec<Payload> {
        vec![vec![1, 2], vec![10, 20], vec![100, u32::MAX]]
    }

    fn feed(engine: &mut SimulatedEngine, order: &[u8]) {
        let inputs = inputs();
        for &level in order {
            let frame = layout()
                .encode(&meta(level), &inputs[usize::from(level)])
                .expect("encode");
            engine.send(&frame).expect("send");
        }
    }

    fn drain(engine: &mut SimulatedEngine) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0_u8; 64];
        while let Ok(len) = engine.receive(&mut buf, Some(Duration::ZERO)) {
            out.push(buf[..len].to_vec());
        }
        out
    }

    #[test]
    fn holds_responses_until_round_complete() {
        let mut engine = SimulatedEngine::new(EngineConfig::new(1));
        feed(&mut engine, &[2, 0]);
        assert_eq!(engine.pending(), 0);
        feed(&mut engine, &[1]);
        assert_eq!(engine.pending(), 3);
        assert_eq!(engine.stats().rounds_completed, 1);
    }

    #[test]
    fn responses_follow_running_sum() {
        let mut engine = SimulatedEngine::new(EngineConfig::new(7).with_reorder(false));
        feed(&mut engine, &[1, 2, 0]);
        let chain = compute_chain(&inputs());
        let frames = drain(&mut engine);
        assert_eq!(frames.len(), 3);
        for (level, frame) in frames.iter().enumerate() {
            let packet = layout().decode(frame).expect("decode");
            assert_eq!(usize::from(packet.meta.level), level);
            assert_eq!(packet.payload, chain[level]);
        }
    }

    #[test]
    fn same_seed_same_arrival() {
        let run = |seed| {
            let mut engine = SimulatedEngine::new(EngineConfig::new(seed));
            feed(&mut engine, &[0, 1, 2]);
            drain(&mut engine)
        };
        assert_eq!(run(99), run(99));
    }

    #[test]
    fn level_offset_shifts_reported_level() {
        let mut engine = SimulatedEngine::new(
            EngineConfig::new(1)
                .with_reorder(false)
                .with_level_offset(1),
        );
        feed(&mut engine, &[0, 1, 2]);
        let levels: Vec<u8> = drain(&mut engine).iter().map(|f| f[7]).collect();
        assert_eq!(levels, vec![1, 2, 3]);
    }

    #[test]
    fn duplicate_and_drop_faults() {
        let faults = EngineFaults::none().with_duplicate(1).with_drop(2);
        let mut engine = SimulatedEngine::new(
            EngineConfig::new(1)
                .with_reorder(false)
                .with_faults(faults),
        );
        feed(&mut engine, &[0, 1, 2]);
        let levels: Vec<u8> = drain(&mut engine).iter().map(|f| f[7]).collect();
        assert_eq!(levels, vec![1, 1, 0]);
        assert_eq!(engine.stats().faults_injected, 2);
    }

    #[test]
    fn faults_limited_to_round() {
        let faults = EngineFaults::none().with_drop(0).in_round(1);
        let mut engine = SimulatedEngine::new(EngineConfig::new(1).with_faults(faults));
        feed(&mut engine, &[0, 1, 2]);
        assert_eq!(drain(&mut engine).len(), 3);
        feed(&mut engine, &[0, 1, 2]);
        assert_eq!(drain(&mut engine).len(), 2);
    }

    #[test]
    fn empty_and_truncate_faults_change_lengths() {
        let faults = EngineFaults::none().with_empty(0).with_truncation(2, 3);
        let mut engine = SimulatedEngine::new(
            EngineConfig::new(1)
                .with_reorder(false)
                .with_faults(faults),
        );
        feed(&mut engine, &[0, 1, 2]);
        let lens: Vec<usize> = drain(&mut engine).iter().map(Vec::len).collect();
        assert_eq!(lens, vec![0, 16, 13]);
    }

    #[test]
    fn rejects_restaged_level() {
        let mut engine = SimulatedEngine::new(EngineConfig::default());
        feed(&mut engine, &[0]);
        let frame = layout().encode(&meta(0), &[0, 0]).expect("encode");
        assert!(matches!(
            engine.send(&frame),
            Err(TransportError::SendFailed { .. })
        ));
    }

    #[test]
    fn small_receive_buffer_is_oversized() {
        let mut engine = SimulatedEngine::new(EngineConfig::default());
        feed(&mut engine, &[0, 1, 2]);
        let mut tiny = [0_u8; 4];
        assert!(matches!(
            engine.receive(&mut tiny, None),
            Err(TransportError::Oversized { len: 16, capacity: 4 })
        ));
    }
}
