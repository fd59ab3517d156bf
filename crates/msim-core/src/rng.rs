//! Deterministic seeded RNG wrapper.
//!
//! One `SimRng` per construction context (the loader, a test) keeps runs
//! reproducible for a fixed configuration: the same seed always yields the
//! same random-time draws, regardless of what other threads do.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// 64-bit fractional golden-ratio constant; spreads consecutive offsets
/// uniformly across the seed space when deriving child RNGs.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Seeded simulation RNG.
///
/// Intentionally `!Sync`: each thread that needs randomness derives its own
/// child via [`SimRng::child`] instead of sharing one generator.
pub struct SimRng(SmallRng);

impl SimRng {
    pub fn new(seed: u64) -> Self {
        SimRng(SmallRng::seed_from_u64(seed))
    }

    /// Derive an independent child generator, deterministically, from this
    /// one and an offset (e.g. a loader batch index).
    pub fn child(&mut self, offset: u64) -> SimRng {
        let seed = self.0.gen::<u64>() ^ offset.wrapping_mul(MIXING_CONSTANT);
        SimRng(SmallRng::seed_from_u64(seed))
    }

    /// Generate a value uniformly in `range`.
    #[inline]
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: rand::distributions::uniform::SampleUniform,
        R: rand::distributions::uniform::SampleRange<T>,
    {
        self.0.gen_range(range)
    }

    /// `true` with probability `p` (clamped to [0, 1]).
    #[inline]
    pub fn gen_bool(&mut self, p: f64) -> bool {
        self.0.gen_bool(p.clamp(0.0, 1.0))
    }
}
