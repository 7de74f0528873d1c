//! Seedable random number generator for the engine.
//!
//! Uses the `rand` crate with `SmallRng`, which is fast and works on WASM
//! (entropy via `getrandom`, the browser crypto API). Every random decision
//! in the engine (mine placement, perturbation targets, candidate
//! shuffles) flows through a single `EngineRng`, so a fixed seed replays a
//! generation run exactly.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

pub struct EngineRng {
    inner: SmallRng,
}

impl EngineRng {
    /// Create from system entropy.
    pub fn new() -> Self {
        Self {
            inner: SmallRng::from_os_rng(),
        }
    }

    /// Create with a specific seed for deterministic behavior.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: SmallRng::seed_from_u64(seed),
        }
    }

    /// Generate a random usize in [0, max). `max` must be nonzero.
    #[inline(always)]
    pub fn gen_range(&mut self, max: usize) -> usize {
        self.inner.random_range(0..max)
    }

    /// Raw 32 random bits; used as shuffle sort keys.
    #[inline(always)]
    pub fn bits(&mut self) -> u32 {
        self.inner.random()
    }
}

impl Default for EngineRng {
    fn default() -> Self {
        Self::new()
    }
}
