//! Deterministic pseudo-random number generator.
//!
//! Every randomized decision the harness makes (transmission order, the lab
//! engine's arrival order) draws from a [`DetRng`]. The generator is seeded
//! explicitly and reports its seed, so a failing run can be replayed exactly
//! from the value printed in its log.
//!
//! # Determinism
//!
//! Given the same seed, the sequence of generated numbers is always identical
//! across platforms and releases.

use std::time::{SystemTime, UNIX_EPOCH};

/// A deterministic pseudo-random number generator using xorshift64.
///
/// The seed is passed through a splitmix64 finalizer before use so that small
/// or adjacent seeds (0, 1, 2, ...) still start from well-separated states.
/// It is NOT cryptographically secure.
#[derive(Debug, Clone)]
pub struct DetRng {
    seed: u64,
    state: u64,
}

impl DetRng {
    /// Creates a new PRNG with the given seed.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        let mixed = splitmix64(seed);
        Self {
            seed,
            // xorshift has a fixed point at zero.
            state: if mixed == 0 { 0x9E37_79B9_7F4A_7C15 } else { mixed },
        }
    }

    /// Derives a seed from the wall clock.
    ///
    /// Only used when the operator did not pin a seed; the caller is expected
    /// to log the returned value.
    #[must_use]
    pub fn clock_seed() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0x5EED, |d| {
                #[allow(clippy::cast_possible_truncation)]
                let nanos = d.as_nanos() as u64;
                splitmix64(nanos)
            })
    }

    /// The seed this generator was constructed with.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Generates the next pseudo-random u64 value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Generates a pseudo-random usize value in the range [0, bound).
    ///
    /// Uses rejection sampling to avoid modulo bias.
    ///
    /// # Panics
    ///
    /// Panics if `bound` is zero.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn next_below(&mut self, bound: usize) -> usize {
        assert!(bound > 0, "bound must be non-zero");
        let bound_u64 = bound as u64;
        let threshold = u64::MAX - (u64::MAX % bound_u64);
        loop {
            let value = self.next_u64();
            if value < threshold {
                return (value % bound_u64) as usize;
            }
        }
    }

    /// Shuffles a slice in place using the Fisher-Yates algorithm.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        for i in (1..slice.len()).rev() {
            let j = self.next_below(i + 1);
            slice.swap(i, j);
        }
    }
}

const fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
