//! # Candidates and evaluation results
//!
//! A [`Candidate`] is one segment count under evaluation. It carries the index
//! of the generation it was bred for, so two candidates with the same value in
//! different generations stay distinguishable in the run history. Duplicate
//! values within a generation are expected.
//!
//! An [`EvaluationResult`] is the oracle's verdict on one candidate. Failure is
//! encoded as a loss of `+infinity` with an empty trace, which sorts after every
//! real loss without any special casing in the ranking code.

use serde::{Deserialize, Serialize};

use crate::{
    error::{EvolveError, Result},
    rng::RandomNumberGenerator,
};

/// Smallest segment count searched when no domain is configured.
pub const MIN_SEGMENTS: u32 = 4;
/// Largest segment count searched when no domain is configured.
pub const MAX_SEGMENTS: u32 = 12;

/// The inclusive range of segment counts the search may visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDomain {
    min: u32,
    max: u32,
}

impl SegmentDomain {
    /// Creates a domain covering `[min, max]`.
    ///
    /// # Errors
    ///
    /// Returns `EvolveError::Configuration` if the range is empty.
    pub fn new(min: u32, max: u32) -> Result<Self> {
        if min > max {
            return Err(EvolveError::Configuration(format!(
                "Segment domain [{}, {}] is empty",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// Smallest segment count in the domain.
    pub fn min(&self) -> u32 {
        self.min
    }

    /// Largest segment count in the domain.
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Whether `segments` lies in `[min, max]`.
    pub fn contains(&self, segments: u32) -> bool {
        (self.min..=self.max).contains(&segments)
    }

    /// Draws one value uniformly from the domain.
    pub fn sample(&self, rng: &mut RandomNumberGenerator) -> u32 {
        rng.uniform_segments(self.min, self.max)
    }
}

impl Default for SegmentDomain {
    fn default() -> Self {
        Self {
            min: MIN_SEGMENTS,
            max: MAX_SEGMENTS,
        }
    }
}

/// One segment count under evaluation in a given generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    segments: u32,
    generation: usize,
}

impl Candidate {
    /// Creates the candidate `segments` bred for generation `generation`.
    pub fn new(segments: u32, generation: usize) -> Self {
        Self {
            segments,
            generation,
        }
    }

    /// The number of rigid-body segments this candidate encodes.
    pub fn segments(&self) -> u32 {
        self.segments
    }

    /// The index of the generation this candidate belongs to.
    pub fn generation(&self) -> usize {
        self.generation
    }
}

/// The outcome of evaluating one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    candidate: Candidate,
    #[serde(with = "failed_loss")]
    loss: f64,
    loss_trace: Vec<f64>,
}

/// Writes the failure loss `+inf` as `null`, which JSON can represent, and
/// reads `null` back as `+inf`.
mod failed_loss {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(loss: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        loss.is_finite().then_some(*loss).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

impl EvaluationResult {
    /// Builds a successful result from the oracle's loss trace.
    ///
    /// The final loss is the last element of the trace. An empty trace or a
    /// final loss that is NaN or infinite is recorded as a failure instead.
    pub fn from_trace(candidate: Candidate, loss_trace: Vec<f64>) -> Self {
        match loss_trace.last().copied() {
            Some(loss) if loss.is_finite() => Self {
                candidate,
                loss,
                loss_trace,
            },
            _ => Self::failed(candidate),
        }
    }

    /// Builds the sentinel result for a candidate whose evaluation failed.
    pub fn failed(candidate: Candidate) -> Self {
        Self {
            candidate,
            loss: f64::INFINITY,
            loss_trace: Vec::new(),
        }
    }

    /// The candidate this result belongs to.
    pub fn candidate(&self) -> Candidate {
        self.candidate
    }

    /// The final loss, or `+inf` for a failed evaluation.
    pub fn loss(&self) -> f64 {
        self.loss
    }

    /// Loss after every simulation iteration; empty for a failed evaluation.
    pub fn loss_trace(&self) -> &[f64] {
        &self.loss_trace
    }

    /// Whether this result is the failure sentinel.
    pub fn is_failed(&self) -> bool {
        self.loss_trace.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_rejects_empty_range() {
        assert!(matches!(
            SegmentDomain::new(9, 4),
            Err(EvolveError::Configuration(_))
        ));
        assert!(SegmentDomain::new(5, 5).is_ok());
    }

    #[test]
    fn test_domain_sample_stays_in_range() {
        let domain = SegmentDomain::new(4, 8).unwrap();
        let mut rng = RandomNumberGenerator::from_seed(3);
        for _ in 0..100 {
            assert!(domain.contains(domain.sample(&mut rng)));
        }
    }

    #[test]
    fn test_result_from_trace_takes_last_loss() {
        let result = EvaluationResult::from_trace(Candidate::new(6, 0), vec![3.0, 2.0, 0.5]);
        assert_eq!(result.loss(), 0.5);
        assert!(!result.is_failed());
    }

    #[test]
    fn test_result_from_empty_trace_is_failure() {
        let result = EvaluationResult::from_trace(Candidate::new(6, 0), Vec::new());
        assert!(result.is_failed());
        assert_eq!(result.loss(), f64::INFINITY);
    }

    #[test]
    fn test_result_with_nan_loss_is_failure() {
        let result = EvaluationResult::from_trace(Candidate::new(6, 0), vec![1.0, f64::NAN]);
        assert!(result.is_failed());
        assert!(result.loss_trace().is_empty());
    }

    #[test]
    fn test_result_with_infinite_loss_is_failure() {
        for loss in [f64::INFINITY, f64::NEG_INFINITY] {
            let result = EvaluationResult::from_trace(Candidate::new(6, 0), vec![1.0, loss]);
            assert!(result.is_failed());
            assert_eq!(result.loss(), f64::INFINITY);
        }
    }

    #[test]
    fn test_failed_result_reads_back_from_json() {
        let failed = EvaluationResult::failed(Candidate::new(9, 2));
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains("\"loss\":null"));

        let back: EvaluationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, failed);
        assert!(back.is_failed());

        let ok = EvaluationResult::from_trace(Candidate::new(5, 1), vec![2.0, 0.75]);
        let json = serde_json::to_string(&ok).unwrap();
        let back: EvaluationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ok);
    }
}
