use std::sync::mpsc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::{
    candidate::{Candidate, EvaluationResult},
    error::{EvolveError, Result},
    oracle::{FitnessOracle, FitnessOracleClient},
};

/// Evaluates whole generations on a fixed-size worker pool.
///
/// Every candidate becomes one task on the pool. Each task sends its result
/// back tagged with the candidate's position, and the dispatcher slots results
/// by that tag, so completion order never matters. A call returns only once
/// every candidate has an outcome.
pub struct EvaluationDispatcher<O> {
    client: FitnessOracleClient<O>,
    pool: ThreadPool,
    workers: usize,
}

impl<O> EvaluationDispatcher<O>
where
    O: FitnessOracle + 'static,
{
    /// Creates a dispatcher running at most `workers` evaluations at once.
    ///
    /// # Errors
    ///
    /// Returns `EvolveError::Configuration` if `workers` is zero and
    /// `EvolveError::WorkerPool` if the pool threads cannot be started. There
    /// is no fallback to serial evaluation.
    pub fn new(client: FitnessOracleClient<O>, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(EvolveError::Configuration(
                "Worker count cannot be zero".to_string(),
            ));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("morphevo-eval-{}", i))
            .build()
            .map_err(|e| EvolveError::WorkerPool(e.to_string()))?;

        Ok(Self {
            client,
            pool,
            workers,
        })
    }

    /// Maximum number of evaluations running at once.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// The client every evaluation goes through.
    pub fn client(&self) -> &FitnessOracleClient<O> {
        &self.client
    }

    /// Evaluates `candidates`, returning one result per position.
    pub fn evaluate_all(&self, candidates: &[Candidate]) -> Vec<EvaluationResult> {
        self.evaluate_all_with_progress(candidates, |_, _| {})
    }

    /// Like [`evaluate_all`](Self::evaluate_all), calling `on_result` on the
    /// calling thread with each `(position, result)` as it completes.
    pub fn evaluate_all_with_progress<F>(
        &self,
        candidates: &[Candidate],
        mut on_result: F,
    ) -> Vec<EvaluationResult>
    where
        F: FnMut(usize, &EvaluationResult),
    {
        let mut slots: Vec<Option<EvaluationResult>> = vec![None; candidates.len()];
        let (tx, rx) = mpsc::channel::<(usize, EvaluationResult)>();

        // The scope body runs here, not on a pool thread, so all workers stay
        // free for evaluations while results are collected.
        self.pool.in_place_scope(|scope| {
            for (position, &candidate) in candidates.iter().enumerate() {
                let tx = tx.clone();
                let client = &self.client;
                scope.spawn(move |_| {
                    let result = client.evaluate(candidate);
                    let _ = tx.send((position, result));
                });
            }
            drop(tx);

            for (position, result) in rx.iter() {
                debug!(
                    position,
                    segments = result.candidate().segments(),
                    loss = result.loss(),
                    "evaluation finished"
                );
                on_result(position, &result);
                slots[position] = Some(result);
            }
        });

        slots
            .into_iter()
            .zip(candidates)
            .map(|(slot, candidate)| slot.unwrap_or_else(|| EvaluationResult::failed(*candidate)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{OracleOutcome, OracleRecord, OracleRequest, OracleSettings};
    use std::time::Duration;

    struct SquareOracle;

    impl FitnessOracle for SquareOracle {
        fn invoke(&self, request: &OracleRequest) -> OracleOutcome {
            let loss = (request.segments * request.segments) as f64;
            OracleOutcome::Completed(OracleRecord::new(&request.token, vec![loss]))
        }
    }

    struct OddFails;

    impl FitnessOracle for OddFails {
        fn invoke(&self, request: &OracleRequest) -> OracleOutcome {
            if request.segments % 2 == 1 {
                OracleOutcome::Failed("diverged".to_string())
            } else {
                OracleOutcome::Completed(OracleRecord::new(&request.token, vec![1.0]))
            }
        }
    }

    fn dispatcher<O: FitnessOracle + 'static>(oracle: O, workers: usize) -> EvaluationDispatcher<O> {
        let client =
            FitnessOracleClient::new(oracle, OracleSettings::default(), Duration::from_secs(5));
        EvaluationDispatcher::new(client, workers).unwrap()
    }

    #[test]
    fn test_zero_workers_rejected() {
        let client = FitnessOracleClient::new(
            SquareOracle,
            OracleSettings::default(),
            Duration::from_secs(1),
        );
        assert!(matches!(
            EvaluationDispatcher::new(client, 0),
            Err(EvolveError::Configuration(_))
        ));
    }

    #[test]
    fn test_one_result_per_position() {
        let candidates: Vec<Candidate> = [4, 5, 4, 9, 7].iter().map(|&s| Candidate::new(s, 0)).collect();
        let results = dispatcher(SquareOracle, 3).evaluate_all(&candidates);

        assert_eq!(results.len(), candidates.len());
        for (candidate, result) in candidates.iter().zip(&results) {
            assert_eq!(result.candidate(), *candidate);
            assert_eq!(result.loss(), (candidate.segments() * candidate.segments()) as f64);
        }
    }

    #[test]
    fn test_failures_do_not_abort_siblings() {
        let candidates: Vec<Candidate> = (1..=6).map(|s| Candidate::new(s, 0)).collect();
        let results = dispatcher(OddFails, 2).evaluate_all(&candidates);

        assert_eq!(results.len(), 6);
        for result in &results {
            assert_eq!(result.is_failed(), result.candidate().segments() % 2 == 1);
        }
    }

    #[test]
    fn test_single_worker_is_enough() {
        let candidates: Vec<Candidate> = (4..=8).map(|s| Candidate::new(s, 1)).collect();
        let results = dispatcher(SquareOracle, 1).evaluate_all(&candidates);
        assert!(results.iter().all(|r| !r.is_failed()));
    }

    #[test]
    fn test_progress_sees_every_position() {
        let candidates: Vec<Candidate> = (4..=9).map(|s| Candidate::new(s, 0)).collect();
        let mut seen = Vec::new();
        dispatcher(SquareOracle, 4)
            .evaluate_all_with_progress(&candidates, |position, _| seen.push(position));
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_empty_generation() {
        assert!(dispatcher(SquareOracle, 2).evaluate_all(&[]).is_empty());
    }
}
