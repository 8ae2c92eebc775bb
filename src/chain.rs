//! Stimulus generation and the expected-output oracle.
//!
//! The oracle models recursive-doubling accumulation as a running sum over
//! levels: level 0 is passed through unchanged and every later level folds
//! its own contribution onto everything accumulated so far.
//!
//! ```text
//! chain[0][i] = input[0][i]
//! chain[L][i] = input[L][i] + chain[L-1][i]     (mod 2^32)
//! ```
//!
//! Nothing here knows how a device schedules its additions. Keeping the
//! oracle a plain recurrence means an engine that accumulates in the wrong
//! order (or skips a level) produces a visible mismatch.

use crate::packet::Payload;

/// Computes the expected cumulative payload for every level.
///
/// `inputs[L]` is the stimulus payload for level `L`; all payloads must have
/// the same length. The returned chain has one entry per input.
///
/// # Panics
///
/// Panics if the payloads do not all have the same length.
#[must_use]
pub fn compute_chain(inputs: &[Payload]) -> Vec<Payload> {
    let mut chain: Vec<Payload> = Vec::with_capacity(inputs.len());
    for input in inputs {
        let next = match chain.last() {
            None => input.clone(),
            Some(prev) => {
                assert_eq!(
                    prev.len(),
                    input.len(),
                    "all level payloads must have the same element count"
                );
                input
                    .iter()
                    .zip(prev)
                    .map(|(x, acc)| x.wrapping_add(*acc))
                    .collect()
            }
        };
        chain.push(next);
    }
    chain
}

/// Minimum distance between the first elements of adjacent levels.
///
/// Frames of up to 1000 elements keep the `level * 1000 + element + 1`
/// pattern that is easy to read in a hex dump.
pub const MIN_LEVEL_STRIDE: u64 = 1000;

/// Deterministic stimulus pattern for one frame geometry.
///
/// Each `(set, level, element)` maps to
/// `set * set_span + level * level_stride + element + 1` where
/// `level_stride = max(1000, element_count)` and
/// `set_span = level_count * level_stride`. Values never collide within a
/// set, and sets below [`distinct_sets`](Self::distinct_sets) never collide
/// with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StimulusPattern {
    level_stride: u64,
    set_span: u64,
}

impl StimulusPattern {
    /// Pattern for `level_count` levels of `element_count` elements.
    #[must_use]
    pub fn new(level_count: usize, element_count: usize) -> Self {
        let level_stride = (element_count as u64).max(MIN_LEVEL_STRIDE);
        Self {
            level_stride,
            set_span: (level_count as u64).saturating_mul(level_stride),
        }
    }

    /// Distance between the first elements of adjacent levels.
    #[must_use]
    pub const fn level_stride(&self) -> u64 {
        self.level_stride
    }

    /// Number of leading test sets whose values are pairwise distinct.
    ///
    /// Zero when a single set does not fit in 32 bits.
    #[must_use]
    pub const fn distinct_sets(&self) -> u64 {
        if self.set_span == 0 {
            return u64::MAX;
        }
        (1_u64 << 32) / self.set_span
    }

    /// Element value, truncated to 32 bits.
    #[must_use]
    pub fn value(&self, set_index: u32, level: u8, element: usize) -> u32 {
        let raw = u64::from(set_index)
            .wrapping_mul(self.set_span)
            .wrapping_add(u64::from(level).wrapping_mul(self.level_stride))
            .wrapping_add(element as u64)
            .wrapping_add(1);
        #[allow(clippy::cast_possible_truncation)]
        let value = raw as u32;
        value
    }
}

/// Generates the per-level input payloads for one test set.
#[must_use]
pub fn generate_inputs(set_index: u32, level_count: usize, element_count: usize) -> Vec<Payload> {
    let pattern = StimulusPattern::new(level_count, element_count);
    (0..level_count)
        .map(|level| {
            let level = u8::try_from(level).unwrap_or(u8::MAX);
            (0..element_count)
                .map(|i| pattern.value(set_index, level, i))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_level_running_sum() {
        let inputs = vec![vec![10], vec![20], vec![30], vec![40]];
        let chain = compute_chain(&inputs);
        assert_eq!(chain, vec![vec![10], vec![30], vec![60], vec![100]]);
    }

    #[test]
    fn wraparound_is_valid() {
        let inputs = vec![vec![0xFFFF_FFFF], vec![1]];
        let chain = compute_chain(&inputs);
        assert_eq!(chain[1], vec![0]);
    }

    #[test]
    fn level_zero_is_identity() {
        let inputs = generate_inputs(3, 4, 16);
        let chain = compute_chain(&inputs);
        assert_eq!(chain[0], inputs[0]);
    }

    #[test]
    fn empty_input_yields_empty_chain() {
        assert!(compute_chain(&[]).is_empty());
    }

    #[test]
    fn first_set_matches_classic_pattern() {
        let inputs = generate_inputs(0, 4, 256);
        assert_eq!(inputs.len(), 4);
        assert_eq!(inputs[0][0], 1);
        assert_eq!(inputs[2][5], 2006);
        assert_eq!(inputs[3][255], 3256);
    }

    #[test]
    fn sets_produce_distinct_stimuli() {
        let a = generate_inputs(0, 2, 8);
        let b = generate_inputs(1, 2, 8);
        assert_ne!(a, b);
    }

    #[test]
    fn wide_frames_keep_levels_apart() {
        let pattern = StimulusPattern::new(4, 4096);
        assert_eq!(pattern.level_stride(), 4096);
        assert_ne!(pattern.value(0, 0, 1000), pattern.value(0, 1, 0));

        let mut seen = std::collections::HashSet::new();
        for level in 0..4 {
            for element in 0..4096 {
                assert!(
                    seen.insert(pattern.value(7, level, element)),
                    "level {level} element {element} collides"
                );
            }
        }
    }

    #[test]
    fn sets_stay_distinct_up_to_limit() {
        let pattern = StimulusPattern::new(4, 256);
        let last = u32::try_from(pattern.distinct_sets() - 1).expect("fits");
        let top = pattern.value(last, 3, 255);
        assert_eq!(u64::from(top), u64::from(last) * 4000 + 3256);
        assert_ne!(pattern.value(0, 0, 0), pattern.value(last, 0, 0));
    }

    #[test]
    fn reference_chain_values() {
        // Element 0 of the reference run: 1, 1001, 2001, 3001.
        let chain = compute_chain(&generate_inputs(0, 4, 1));
        let firsts: Vec<u32> = chain.iter().map(|p| p[0]).collect();
        assert_eq!(firsts, vec![1, 1002, 3003, 6004]);
    }
}
