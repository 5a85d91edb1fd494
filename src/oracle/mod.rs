//! # Fitness oracle
//!
//! The fitness of a segment count is computed outside this crate, by a
//! simulation that may be slow, may crash, and may never return. The
//! [`FitnessOracle`] trait is the request/response boundary to it, and
//! [`FitnessOracleClient`] wraps an oracle so that every call:
//!
//! - carries a fresh, opaque correlation token,
//! - runs on its own thread, so a panicking oracle cannot take a worker down,
//! - is abandoned after a wall-clock timeout and told so through
//!   [`OracleRequest::is_cancelled`],
//! - always yields an [`EvaluationResult`], failed or not.
//!
//! An abandoned call keeps its thread until the oracle notices the
//! cancellation. The client counts those threads and stops starting new calls
//! once [`FitnessOracleClient::abandoned_limit`] of them are still alive.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use morphevo::candidate::Candidate;
//! use morphevo::oracle::{
//!     FitnessOracle, FitnessOracleClient, OracleOutcome, OracleRecord, OracleRequest,
//!     OracleSettings,
//! };
//!
//! struct DistanceToSix;
//!
//! impl FitnessOracle for DistanceToSix {
//!     fn invoke(&self, request: &OracleRequest) -> OracleOutcome {
//!         let loss = (request.segments as f64 - 6.0).abs();
//!         OracleOutcome::Completed(OracleRecord::new(&request.token, vec![loss]))
//!     }
//! }
//!
//! let client = FitnessOracleClient::new(
//!     DistanceToSix,
//!     OracleSettings::default(),
//!     Duration::from_secs(5),
//! );
//! let result = client.evaluate(Candidate::new(8, 0));
//! assert_eq!(result.loss(), 2.0);
//! ```

pub mod command;

use std::{
    fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering},
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    thread,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    candidate::{Candidate, EvaluationResult},
    error::EvolveError,
};

pub use command::CommandOracle;

/// Body shape of the simulated robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    #[default]
    Wheel,
    Circle,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Wheel => write!(f, "wheel"),
            Shape::Circle => write!(f, "circle"),
        }
    }
}

impl FromStr for Shape {
    type Err = EvolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wheel" => Ok(Shape::Wheel),
            "circle" => Ok(Shape::Circle),
            other => Err(EvolveError::Configuration(format!(
                "Unknown shape '{}', expected 'wheel' or 'circle'",
                other
            ))),
        }
    }
}

/// The per-run simulation parameters handed to every oracle call unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleSettings {
    pub run_mode: String,
    pub shape: Shape,
    pub iterations: u32,
    pub path: String,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            run_mode: "para".to_string(),
            shape: Shape::Wheel,
            iterations: 20,
            path: "sine".to_string(),
        }
    }
}

/// Set by the client once it stops waiting for a call.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A single evaluation request.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub segments: u32,
    pub settings: OracleSettings,
    /// Opaque correlation id. The oracle must echo it back in its record.
    pub token: String,
    /// Wall-clock budget for this call.
    pub timeout: Duration,
    /// Raised when the caller has given up on this call.
    pub cancel: CancelFlag,
}

impl OracleRequest {
    /// Builds a request with a fresh, unraised cancellation flag.
    pub fn new(
        segments: u32,
        settings: OracleSettings,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            segments,
            settings,
            token: token.into(),
            timeout,
            cancel: CancelFlag::new(),
        }
    }

    /// Whether the caller has stopped waiting for this call. Oracles should
    /// check it while they work and return as soon as it is set.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Positional arguments in invocation order:
    /// segments, run mode, shape, iterations, path, token.
    pub fn arguments(&self) -> Vec<String> {
        vec![
            self.segments.to_string(),
            self.settings.run_mode.clone(),
            self.settings.shape.to_string(),
            self.settings.iterations.to_string(),
            self.settings.path.clone(),
            self.token.clone(),
        ]
    }
}

/// The result record an oracle deposits on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleRecord {
    pub token: String,
    #[serde(default)]
    pub robot_id: Option<u64>,
    pub losses: Vec<f64>,
}

impl OracleRecord {
    pub fn new(token: &str, losses: Vec<f64>) -> Self {
        Self {
            token: token.to_string(),
            robot_id: None,
            losses,
        }
    }
}

/// What an oracle reports back for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleOutcome {
    Completed(OracleRecord),
    Failed(String),
}

/// An external fitness function over segment counts.
///
/// Implementations must be re-entrant: the dispatcher calls `invoke` from many
/// threads at once, and each call must keep its output apart using the
/// request token.
///
/// A call that outlives `request.timeout` is abandoned and its request is
/// cancelled. Implementations must poll [`OracleRequest::is_cancelled`] during
/// long work and return promptly once it is set; the outcome is discarded.
pub trait FitnessOracle: Send + Sync {
    fn invoke(&self, request: &OracleRequest) -> OracleOutcome;
}

impl<O: FitnessOracle + ?Sized> FitnessOracle for Arc<O> {
    fn invoke(&self, request: &OracleRequest) -> OracleOutcome {
        (**self).invoke(request)
    }
}

impl<O: FitnessOracle + ?Sized> FitnessOracle for Box<O> {
    fn invoke(&self, request: &OracleRequest) -> OracleOutcome {
        (**self).invoke(request)
    }
}

/// Abandoned calls tolerated by a client built with [`FitnessOracleClient::new`].
pub const DEFAULT_ABANDONED_LIMIT: usize = 16;

const CALL_RUNNING: u8 = 0;
const CALL_FINISHED: u8 = 1;
const CALL_ABANDONED: u8 = 2;

/// Marks a call finished when its thread exits, normally or by panic.
struct CallExit {
    state: Arc<AtomicU8>,
    abandoned: Arc<AtomicUsize>,
}

impl Drop for CallExit {
    fn drop(&mut self) {
        let finished = self.state.compare_exchange(
            CALL_RUNNING,
            CALL_FINISHED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if finished.is_err() {
            self.abandoned.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Runs one isolated, time-bounded oracle call per candidate.
pub struct FitnessOracleClient<O> {
    oracle: Arc<O>,
    settings: OracleSettings,
    timeout: Duration,
    abandoned: Arc<AtomicUsize>,
    abandoned_limit: usize,
}

impl<O> Clone for FitnessOracleClient<O> {
    fn clone(&self) -> Self {
        Self {
            oracle: Arc::clone(&self.oracle),
            settings: self.settings.clone(),
            timeout: self.timeout,
            abandoned: Arc::clone(&self.abandoned),
            abandoned_limit: self.abandoned_limit,
        }
    }
}

impl<O> fmt::Debug for FitnessOracleClient<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FitnessOracleClient")
            .field("settings", &self.settings)
            .field("timeout", &self.timeout)
            .field("abandoned", &self.abandoned.load(Ordering::SeqCst))
            .field("abandoned_limit", &self.abandoned_limit)
            .finish_non_exhaustive()
    }
}

impl<O> FitnessOracleClient<O>
where
    O: FitnessOracle + 'static,
{
    pub fn new(oracle: O, settings: OracleSettings, timeout: Duration) -> Self {
        Self {
            oracle: Arc::new(oracle),
            settings,
            timeout,
            abandoned: Arc::new(AtomicUsize::new(0)),
            abandoned_limit: DEFAULT_ABANDONED_LIMIT,
        }
    }

    /// Sets how many timed-out calls may still be running before new calls
    /// fail without starting.
    ///
    /// The limit is checked when a call starts, so concurrent callers can each
    /// push the count one past it.
    pub fn with_abandoned_limit(mut self, limit: usize) -> Self {
        self.abandoned_limit = limit;
        self
    }

    /// The simulation settings passed to every call.
    pub fn settings(&self) -> &OracleSettings {
        &self.settings
    }

    /// The wall-clock budget of one call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn abandoned_limit(&self) -> usize {
        self.abandoned_limit
    }

    /// Timed-out calls whose threads have not exited yet.
    pub fn abandoned_calls(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Evaluates one candidate, blocking until the oracle answers or the
    /// timeout elapses.
    ///
    /// Never fails: crashes, timeouts, malformed records and records carrying
    /// another call's token all come back as [`EvaluationResult::failed`].
    /// While the abandoned limit is reached, calls fail without starting.
    pub fn evaluate(&self, candidate: Candidate) -> EvaluationResult {
        let abandoned = self.abandoned_calls();
        if abandoned >= self.abandoned_limit {
            warn!(
                segments = candidate.segments(),
                abandoned,
                "too many timed-out oracle calls still running, skipping call"
            );
            return EvaluationResult::failed(candidate);
        }

        let token = Uuid::new_v4().simple().to_string();
        let request = OracleRequest::new(
            candidate.segments(),
            self.settings.clone(),
            token.clone(),
            self.timeout,
        );
        let cancel = request.cancel.clone();
        let state = Arc::new(AtomicU8::new(CALL_RUNNING));

        let (tx, rx) = mpsc::channel();
        let oracle = Arc::clone(&self.oracle);
        let exit = CallExit {
            state: Arc::clone(&state),
            abandoned: Arc::clone(&self.abandoned),
        };
        let spawned = thread::Builder::new()
            .name(format!("oracle-{}", candidate.segments()))
            .spawn(move || {
                let _exit = exit;
                let outcome = oracle.invoke(&request);
                // The receiver is gone if the call already timed out.
                let _ = tx.send(outcome);
            });

        if let Err(e) = spawned {
            warn!(segments = candidate.segments(), error = %e, "could not start oracle call");
            return EvaluationResult::failed(candidate);
        }

        match rx.recv_timeout(self.timeout) {
            Ok(OracleOutcome::Completed(record)) if record.token == token => {
                debug!(
                    segments = candidate.segments(),
                    robot_id = ?record.robot_id,
                    iterations = record.losses.len(),
                    "oracle call completed"
                );
                let result = EvaluationResult::from_trace(candidate, record.losses);
                if result.is_failed() {
                    warn!(segments = candidate.segments(), "oracle returned an unusable loss trace");
                }
                result
            }
            Ok(OracleOutcome::Completed(record)) => {
                warn!(
                    segments = candidate.segments(),
                    expected = %token,
                    received = %record.token,
                    "oracle record carries a foreign token"
                );
                EvaluationResult::failed(candidate)
            }
            Ok(OracleOutcome::Failed(reason)) => {
                warn!(segments = candidate.segments(), %reason, "oracle call failed");
                EvaluationResult::failed(candidate)
            }
            Err(RecvTimeoutError::Timeout) => {
                self.abandon(&state, &cancel);
                warn!(
                    segments = candidate.segments(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "oracle call timed out"
                );
                EvaluationResult::failed(candidate)
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!(segments = candidate.segments(), "oracle call panicked");
                EvaluationResult::failed(candidate)
            }
        }
    }

    fn abandon(&self, state: &AtomicU8, cancel: &CancelFlag) {
        self.abandoned.fetch_add(1, Ordering::SeqCst);
        let abandoned = state.compare_exchange(
            CALL_RUNNING,
            CALL_ABANDONED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if abandoned.is_err() {
            // The call finished between the timeout and now.
            self.abandoned.fetch_sub(1, Ordering::SeqCst);
        }
        cancel.cancel();
    }
}
