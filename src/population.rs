//! # Population, generations and run history
//!
//! A [`Population`] is the candidate set about to be evaluated. Once its results
//! are in, it is frozen into a [`Generation`] and appended to the
//! [`RunHistory`]. Neither is ever edited afterwards; the next round gets a new
//! `Population` built through [`Population::replace`].

use serde::{Deserialize, Serialize};

use crate::{
    candidate::{Candidate, EvaluationResult, SegmentDomain},
    error::{EvolveError, Result},
    rng::RandomNumberGenerator,
};

/// The candidate set of the generation currently being evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    index: usize,
    domain: SegmentDomain,
    candidates: Vec<Candidate>,
}

impl Population {
    /// Builds generation 0 by drawing `size` candidates uniformly from `domain`.
    ///
    /// # Errors
    ///
    /// Returns `EvolveError::EmptyPopulation` if `size` is zero.
    pub fn initialize(
        size: usize,
        domain: SegmentDomain,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Self> {
        if size == 0 {
            return Err(EvolveError::EmptyPopulation);
        }

        let candidates = (0..size)
            .map(|_| Candidate::new(domain.sample(rng), 0))
            .collect();

        Ok(Self {
            index: 0,
            domain,
            candidates,
        })
    }

    /// Builds the next generation from bred segment counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of values differs from the current
    /// population size or if any value lies outside the domain.
    pub fn replace(&self, next: Vec<u32>) -> Result<Self> {
        if next.len() != self.candidates.len() {
            return Err(EvolveError::Configuration(format!(
                "Next generation has {} candidates, expected {}",
                next.len(),
                self.candidates.len()
            )));
        }

        if let Some(&bad) = next.iter().find(|&&v| !self.domain.contains(v)) {
            return Err(EvolveError::OutOfBounds(format!(
                "{} not in [{}, {}]",
                bad,
                self.domain.min(),
                self.domain.max()
            )));
        }

        let index = self.index + 1;
        Ok(Self {
            index,
            domain: self.domain,
            candidates: next.into_iter().map(|v| Candidate::new(v, index)).collect(),
        })
    }

    /// Index of the generation this population will become.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates in position order.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Segment counts in position order.
    pub fn segments(&self) -> Vec<u32> {
        self.candidates.iter().map(Candidate::segments).collect()
    }

    /// Freezes this population together with its results.
    ///
    /// # Errors
    ///
    /// Returns an error unless there is exactly one result per position and
    /// each result belongs to the candidate at that position.
    pub fn complete(&self, results: Vec<EvaluationResult>) -> Result<Generation> {
        if results.len() != self.candidates.len() {
            return Err(EvolveError::Generation {
                generation: self.index,
                reason: format!(
                    "{} results for {} candidates",
                    results.len(),
                    self.candidates.len()
                ),
            });
        }

        let misplaced = self
            .candidates
            .iter()
            .zip(&results)
            .position(|(candidate, result)| result.candidate() != *candidate);
        if let Some(position) = misplaced {
            return Err(EvolveError::Generation {
                generation: self.index,
                reason: format!("result at position {} belongs to another candidate", position),
            });
        }

        Ok(Generation {
            index: self.index,
            candidates: self.candidates.clone(),
            results,
        })
    }
}

/// One evaluated round: candidates and their results, aligned by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    index: usize,
    candidates: Vec<Candidate>,
    results: Vec<EvaluationResult>,
}

impl Generation {
    /// Zero-based position of this generation in the run.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Candidates in position order.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Results in candidate position order.
    pub fn results(&self) -> &[EvaluationResult] {
        &self.results
    }

    /// The lowest-loss result; the earliest position wins ties.
    pub fn best(&self) -> Option<&EvaluationResult> {
        self.results
            .iter()
            .reduce(|best, r| if r.loss() < best.loss() { r } else { best })
    }

    /// Number of candidates whose evaluation failed.
    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_failed()).count()
    }
}

/// The append-only record of every completed generation of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunHistory {
    generations: Vec<Generation>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a completed generation.
    pub fn push(&mut self, generation: Generation) {
        self.generations.push(generation);
    }

    /// Completed generations, oldest first.
    pub fn generations(&self) -> &[Generation] {
        &self.generations
    }

    /// Number of completed generations.
    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    /// The most recently completed generation.
    pub fn last(&self) -> Option<&Generation> {
        self.generations.last()
    }

    /// The lowest-loss result across every generation.
    ///
    /// Earlier generations, then earlier positions, win ties. Returns `None`
    /// when every evaluation of the run failed.
    pub fn best_overall(&self) -> Option<&EvaluationResult> {
        self.generations
            .iter()
            .flat_map(|g| g.results())
            .filter(|r| !r.is_failed())
            .reduce(|best, r| if r.loss() < best.loss() { r } else { best })
    }
}
