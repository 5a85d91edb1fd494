//! # BreedStrategy
//!
//! The `BreedStrategy` trait turns one evaluated generation into the segment
//! counts of the next. The controller is generic over it; the search uses
//! [`TruncationBreeder`] by default.
pub mod truncation;

use std::fmt::Debug;

use crate::{
    candidate::{EvaluationResult, SegmentDomain},
    error::Result,
    rng::RandomNumberGenerator,
};

pub use truncation::{midpoint, rank_by_loss, TruncationBreeder};

pub trait BreedStrategy
where
    Self: Debug + Clone + Send + Sync,
{
    /// Produces exactly `population_size` segment counts for the next generation.
    ///
    /// `results` holds one entry per candidate of the finished generation, in
    /// position order. Every returned value must lie in `domain`.
    ///
    /// ## Errors
    ///
    /// Fails if `results` is empty.
    fn select_and_breed(
        &self,
        results: &[EvaluationResult],
        population_size: usize,
        domain: &SegmentDomain,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Vec<u32>>;
}
