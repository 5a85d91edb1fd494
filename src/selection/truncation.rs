use std::cmp::Ordering;

use crate::{
    candidate::{EvaluationResult, SegmentDomain},
    error::{EvolveError, Result},
    rng::RandomNumberGenerator,
};

use super::BreedStrategy;

/// Truncation selection followed by midpoint crossover and redraw mutation.
///
/// 1. Results are ranked by ascending loss. The sort is stable, so equal losses
///    keep their original positions, and failed evaluations (`+inf`) come last.
/// 2. The best `ceil(population_size / 2)` successful candidates form the
///    breeding pool. Failed candidates only breed when every candidate failed,
///    so the pool is never empty.
/// 3. Each offspring draws two parents from the pool, uniformly and with
///    replacement, and takes the floor of their mean. With probability
///    `mutation_rate` that value is thrown away and a fresh value is drawn
///    uniformly from the domain.
///
/// Random draws per offspring, in order: first parent, second parent, mutation
/// roll, then the replacement value if the roll fired.
///
/// # Examples
///
/// ```
/// use morphevo::candidate::{Candidate, EvaluationResult, SegmentDomain};
/// use morphevo::rng::RandomNumberGenerator;
/// use morphevo::selection::{BreedStrategy, TruncationBreeder};
///
/// let results: Vec<EvaluationResult> = [4, 6, 8, 10]
///     .iter()
///     .map(|&s| EvaluationResult::from_trace(Candidate::new(s, 0), vec![s as f64]))
///     .collect();
///
/// let breeder = TruncationBreeder::new(0.0).unwrap();
/// let domain = SegmentDomain::new(4, 12).unwrap();
/// let mut rng = RandomNumberGenerator::from_seed(1);
/// let next = breeder.select_and_breed(&results, 4, &domain, &mut rng).unwrap();
///
/// // The pool is {4, 6}, so every offspring is 4, 5 or 6.
/// assert!(next.iter().all(|v| (4..=6).contains(v)));
/// ```
#[derive(Debug, Clone)]
pub struct TruncationBreeder {
    mutation_rate: f64,
}

impl TruncationBreeder {
    /// # Errors
    ///
    /// Returns `EvolveError::Configuration` if `mutation_rate` is outside `[0, 1]`.
    pub fn new(mutation_rate: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&mutation_rate) {
            return Err(EvolveError::Configuration(format!(
                "Mutation rate {} is outside [0, 1]",
                mutation_rate
            )));
        }
        Ok(Self { mutation_rate })
    }

    /// Probability that an offspring is redrawn from the domain.
    pub fn mutation_rate(&self) -> f64 {
        self.mutation_rate
    }

    /// Segment counts of the breeding pool, best first.
    ///
    /// Only successful results are eligible, so the pool may be smaller than
    /// `ceil(population_size / 2)`. When nothing succeeded the pool is taken
    /// from the full ranking instead.
    pub fn breeding_pool(results: &[EvaluationResult], population_size: usize) -> Vec<u32> {
        let keep = ((population_size + 1) / 2).max(1);
        let ranked = rank_by_loss(results);
        let successful: Vec<usize> = ranked
            .iter()
            .copied()
            .filter(|&i| !results[i].is_failed())
            .collect();
        let eligible = if successful.is_empty() { ranked } else { successful };

        eligible
            .into_iter()
            .take(keep)
            .map(|i| results[i].candidate().segments())
            .collect()
    }
}

impl Default for TruncationBreeder {
    fn default() -> Self {
        Self {
            mutation_rate: crate::evolution::options::DEFAULT_MUTATION_RATE,
        }
    }
}

/// Positions of `results` ordered by ascending loss, ties by position.
pub fn rank_by_loss(results: &[EvaluationResult]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..results.len()).collect();
    indices.sort_by(|&a, &b| {
        results[a]
            .loss()
            .partial_cmp(&results[b].loss())
            .unwrap_or(Ordering::Equal)
    });
    indices
}

/// Floor of the mean of two segment counts.
pub fn midpoint(a: u32, b: u32) -> u32 {
    ((a as u64 + b as u64) / 2) as u32
}

impl BreedStrategy for TruncationBreeder {
    fn select_and_breed(
        &self,
        results: &[EvaluationResult],
        population_size: usize,
        domain: &SegmentDomain,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Vec<u32>> {
        if results.is_empty() {
            return Err(EvolveError::EmptyPopulation);
        }

        let pool = Self::breeding_pool(results, population_size);

        let offspring = (0..population_size)
            .map(|_| {
                let first = pool[rng.index(pool.len())];
                let second = pool[rng.index(pool.len())];
                let child = midpoint(first, second);
                if rng.chance(self.mutation_rate) {
                    domain.sample(rng)
                } else {
                    child
                }
            })
            .collect();

        Ok(offspring)
    }
}
