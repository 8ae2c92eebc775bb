//! Transmission-order scheduling.
//!
//! Each test set transmits its level stimuli in a fresh uniformly random
//! order. The scheduler owns a seeded [`DetRng`], so the sequence of orders
//! across a whole run is a pure function of the seed.

use crate::util::DetRng;

/// Produces per-test-set transmission permutations.
#[derive(Debug, Clone)]
pub struct OrderScheduler {
    rng: DetRng,
}

impl OrderScheduler {
    /// Creates a scheduler from an explicit seed.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            rng: DetRng::new(seed),
        }
    }

    /// Seed to log for replaying this run.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Returns a uniformly random permutation of `0..n`.
    ///
    /// Fisher-Yates: for `i` from `n - 1` down to 1, draw `j` uniformly from
    /// `0..=i` and swap positions `i` and `j`.
    pub fn permute(&mut self, n: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..n).collect();
        self.rng.shuffle(&mut order);
        order
    }
}

/// Returns `true` if `order` contains every index in `0..order.len()` once.
#[must_use]
pub fn is_bijection(order: &[usize]) -> bool {
    let mut seen = vec![false; order.len()];
    for &idx in order {
        match seen.get_mut(idx) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}
