//! Seedable noise for simulated sensor values
//!
//! Seed 0 draws from OS entropy; any other seed gives a reproducible stream.

use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, StandardNormal, Uniform};

/// Noise generator with configurable seed for reproducibility
#[derive(Clone)]
pub struct NoiseGenerator {
    rng: SmallRng,
}

impl NoiseGenerator {
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self { rng }
    }

    /// Generator for one channel, derived from the source seed.
    ///
    /// Channels get independent streams while staying reproducible as a set.
    pub fn for_channel(seed: u64, channel: usize) -> Self {
        if seed == 0 {
            Self::new(0)
        } else {
            // Golden-ratio stride keeps per-channel seeds apart
            Self::new(seed.wrapping_add((channel as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)))
        }
    }

    /// Gaussian noise with given standard deviation
    #[inline]
    pub fn gaussian(&mut self, stddev: f32) -> f32 {
        if stddev == 0.0 {
            return 0.0;
        }
        let n: f32 = self.rng.sample(StandardNormal);
        n * stddev
    }

    /// Add independent Gaussian noise to every value
    pub fn perturb(&mut self, values: &mut [f32], stddev: f32) {
        for v in values.iter_mut() {
            *v += self.gaussian(stddev);
        }
    }

    /// Uniform random in [0, 1)
    #[inline]
    pub fn uniform(&mut self) -> f32 {
        Uniform::new(0.0f32, 1.0).sample(&mut self.rng)
    }
}
