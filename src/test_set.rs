//! One round of the recursive-doubling protocol.
//!
//! A [`TestSet`] bundles everything a single round needs: the per-level
//! stimuli, the order they will be transmitted in, and the expected chain
//! computed from them. It is built once per round and never mutated.

use crate::chain::{compute_chain, generate_inputs};
use crate::config::PacketConfig;
use crate::packet::{PacketError, PacketLayout, PacketMeta, Payload};
use crate::schedule::{OrderScheduler, is_bijection};

/// Immutable description of one test round.
#[derive(Debug, Clone)]
pub struct TestSet {
    index: u32,
    packet: PacketConfig,
    inputs: Vec<Payload>,
    order: Vec<usize>,
    chain: Vec<Payload>,
}

impl TestSet {
    /// Prepares round `index`: generates stimuli, draws a transmission order
    /// and computes the expected chain.
    #[must_use]
    pub fn prepare(index: u32, packet: &PacketConfig, scheduler: &mut OrderScheduler) -> Self {
        let level_count = packet.level_count();
        let inputs = generate_inputs(index, level_count, packet.element_count);
        let order = scheduler.permute(level_count);
        Self::from_parts(index, packet.clone(), inputs, order)
    }

    /// Builds a round from explicit stimuli and order.
    ///
    /// # Panics
    ///
    /// Panics if `inputs` does not hold one payload of `element_count`
    /// elements per level, or if `order` is not a permutation of the levels.
    #[must_use]
    pub fn from_parts(
        index: u32,
        packet: PacketConfig,
        inputs: Vec<Payload>,
        order: Vec<usize>,
    ) -> Self {
        assert_eq!(
            inputs.len(),
            packet.level_count(),
            "one input payload per level required"
        );
        assert!(
            inputs.iter().all(|p| p.len() == packet.element_count),
            "every payload must carry element_count elements"
        );
        assert!(
            order.len() == inputs.len() && is_bijection(&order),
            "transmission order must be a permutation of the levels: {order:?}"
        );
        let chain = compute_chain(&inputs);
        Self {
            index,
            packet,
            inputs,
            order,
            chain,
        }
    }

    /// Round index.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Number of levels in the round.
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.inputs.len()
    }

    /// Frame layout.
    #[must_use]
    pub const fn layout(&self) -> PacketLayout {
        self.packet.layout()
    }

    /// Packet configuration the round was built from.
    #[must_use]
    pub const fn packet(&self) -> &PacketConfig {
        &self.packet
    }

    /// Per-level stimuli.
    #[must_use]
    pub fn inputs(&self) -> &[Payload] {
        &self.inputs
    }

    /// Transmission order (level indices).
    #[must_use]
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Expected cumulative output per level.
    #[must_use]
    pub fn chain(&self) -> &[Payload] {
        &self.chain
    }

    /// Metadata of the stimulus for `level`.
    #[must_use]
    pub const fn stimulus_meta(&self, level: u8) -> PacketMeta {
        self.packet.meta(level)
    }

    /// Encoded stimulus frame for level index `level`.
    pub fn stimulus_frame(&self, level: usize) -> Result<Vec<u8>, PacketError> {
        let tag = u8::try_from(level).unwrap_or(u8::MAX);
        self.layout()
            .encode(&self.stimulus_meta(tag), &self.inputs[level])
    }

    /// Encoded frame the device must return for chain index `index` when it
    /// reports `response_level` in the level field.
    pub fn expected_frame(&self, response_level: u8, index: usize) -> Result<Vec<u8>, PacketError> {
        self.layout()
            .encode(&self.stimulus_meta(response_level), &self.chain[index])
    }
}
