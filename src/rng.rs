//! # RandomNumberGenerator
//!
//! The `RandomNumberGenerator` struct is the single source of randomness for a
//! run. Every draw (initial population, parent picks, mutation rolls) happens on
//! the controller thread between generations, so seeding it makes the whole
//! run reproducible regardless of how the evaluation pool schedules work.
//!
//! ## Example
//!
//! ```rust
//! use morphevo::rng::RandomNumberGenerator;
//!
//! let mut rng = RandomNumberGenerator::from_seed(7);
//! let segments = rng.uniform_segments(4, 12);
//! assert!((4..=12).contains(&segments));
//! ```

use rand::{rngs::StdRng, Rng, SeedableRng};

/// A wrapper around the `rand` crate's `StdRng` with the draws the search needs.
#[derive(Clone, Debug)]
pub struct RandomNumberGenerator {
    pub rng: StdRng,
}

impl RandomNumberGenerator {
    /// Creates a new `RandomNumberGenerator` instance seeded from the system entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates a new `RandomNumberGenerator` instance with a specific seed.
    ///
    /// This is useful for reproducible runs and tests.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draws a segment count uniformly from the inclusive range `[min, max]`.
    pub fn uniform_segments(&mut self, min: u32, max: u32) -> u32 {
        self.rng.gen_range(min..=max)
    }

    /// Draws an index uniformly from `0..len`. `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    /// Returns `true` with the given probability.
    ///
    /// A draw from `[0, 1)` is compared against `probability`, so `0.0` never
    /// fires and `1.0` always does.
    pub fn chance(&mut self, probability: f64) -> bool {
        self.rng.gen::<f64>() < probability
    }
}

impl Default for RandomNumberGenerator {
    fn default() -> Self {
        Self::new()
    }
}
