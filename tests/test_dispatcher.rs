use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use morphevo::{
    candidate::Candidate,
    evolution::EvaluationDispatcher,
    oracle::{
        FitnessOracle, FitnessOracleClient, OracleOutcome, OracleRecord, OracleRequest,
        OracleSettings,
    },
};

/// Finishes small segment counts last and remembers the order calls returned in.
#[derive(Default)]
struct SlowSmallOracle {
    completed: Mutex<Vec<u32>>,
}

impl FitnessOracle for SlowSmallOracle {
    fn invoke(&self, request: &OracleRequest) -> OracleOutcome {
        let delay = (9 - request.segments as u64) * 40;
        thread::sleep(Duration::from_millis(delay));
        self.completed.lock().unwrap().push(request.segments);
        OracleOutcome::Completed(OracleRecord::new(
            &request.token,
            vec![100.0, request.segments as f64],
        ))
    }
}

struct NeverReturns;

impl FitnessOracle for NeverReturns {
    fn invoke(&self, _request: &OracleRequest) -> OracleOutcome {
        loop {
            thread::park();
        }
    }
}

/// Stops when cancelled and tracks how many calls run at once.
#[derive(Default)]
struct StopsOnCancel {
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl FitnessOracle for StopsOnCancel {
    fn invoke(&self, request: &OracleRequest) -> OracleOutcome {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
        while !request.is_cancelled() {
            thread::sleep(Duration::from_millis(1));
        }
        self.live.fetch_sub(1, Ordering::SeqCst);
        OracleOutcome::Failed("cancelled".to_string())
    }
}

fn dispatcher<O: FitnessOracle + 'static>(
    oracle: O,
    workers: usize,
    timeout: Duration,
) -> EvaluationDispatcher<O> {
    let client = FitnessOracleClient::new(oracle, OracleSettings::default(), timeout);
    EvaluationDispatcher::new(client, workers).unwrap()
}

#[test]
fn test_results_follow_positions_not_completion_order() {
    let oracle = Arc::new(SlowSmallOracle::default());
    let candidates: Vec<Candidate> = (1..=8).map(|s| Candidate::new(s, 0)).collect();

    let results =
        dispatcher(Arc::clone(&oracle), 8, Duration::from_secs(10)).evaluate_all(&candidates);

    let completed = oracle.completed.lock().unwrap().clone();
    assert_eq!(completed.first(), Some(&8));
    assert_eq!(completed.last(), Some(&1));

    assert_eq!(results.len(), 8);
    for (candidate, result) in candidates.iter().zip(&results) {
        assert_eq!(result.candidate(), *candidate);
        assert_eq!(result.loss(), candidate.segments() as f64);
    }
}

#[test]
fn test_workers_bound_concurrency() {
    let candidates: Vec<Candidate> = (5..=8).map(|s| Candidate::new(s, 0)).collect();
    let started = Instant::now();
    dispatcher(SlowSmallOracle::default(), 1, Duration::from_secs(10)).evaluate_all(&candidates);

    // One worker runs 160 + 120 + 80 + 40 ms back to back.
    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[test]
fn test_hung_oracle_times_out() {
    let candidates: Vec<Candidate> = (4..=6).map(|s| Candidate::new(s, 0)).collect();
    let started = Instant::now();
    let results =
        dispatcher(NeverReturns, 3, Duration::from_millis(150)).evaluate_all(&candidates);

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.is_failed()));
    assert!(results.iter().all(|r| r.loss() == f64::INFINITY));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_timed_out_calls_do_not_pile_up() {
    let oracle = Arc::new(StopsOnCancel::default());
    let dispatcher = dispatcher(Arc::clone(&oracle), 2, Duration::from_millis(20));
    let candidates: Vec<Candidate> = (4..12).map(|s| Candidate::new(s, 0)).collect();

    for _ in 0..10 {
        let results = dispatcher.evaluate_all(&candidates);
        assert!(results.iter().all(|r| r.is_failed()));
    }

    // Each worker's call may overlap the one it abandoned while that one
    // notices the cancellation.
    assert!(oracle.peak.load(Ordering::SeqCst) <= 4);
    let mut live = oracle.live.load(Ordering::SeqCst);
    for _ in 0..200 {
        if live == 0 {
            break;
        }
        thread::sleep(Duration::from_millis(10));
        live = oracle.live.load(Ordering::SeqCst);
    }
    assert_eq!(live, 0);
}

#[test]
fn test_uncooperative_calls_are_capped() {
    let client = FitnessOracleClient::new(
        NeverReturns,
        OracleSettings::default(),
        Duration::from_millis(20),
    )
    .with_abandoned_limit(2);
    let dispatcher = EvaluationDispatcher::new(client, 2).unwrap();
    let candidates: Vec<Candidate> = (4..12).map(|s| Candidate::new(s, 0)).collect();

    for _ in 0..10 {
        dispatcher.evaluate_all(&candidates);
    }
    // Calls already in flight on the other worker may overshoot the limit by one.
    let abandoned = dispatcher.client().abandoned_calls();
    assert!((2..=3).contains(&abandoned), "{} calls abandoned", abandoned);
}
