//! # RunConfig
//!
//! The `RunConfig` struct holds everything a run needs, fixed for its whole
//! lifetime: the simulation settings forwarded to the oracle, the search
//! parameters, and the resource limits of the evaluation pool.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use morphevo::evolution::options::{LogLevel, RunConfig};
//! use morphevo::oracle::Shape;
//!
//! let config = RunConfig::builder()
//!     .shape(Shape::Circle)
//!     .iterations(30)
//!     .path("cos")
//!     .generation_count(5)
//!     .population_size(8)
//!     .segment_domain(4, 8)
//!     .evaluation_timeout(Duration::from_secs(600))
//!     .log_level(LogLevel::Minimal)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.population_size(), 8);
//! ```
//!
//! ## Command line form
//!
//! [`RunConfig::from_args`] accepts the positional form
//! `<run_mode> <shape> <iterations> <path> <generations> <population_size>`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    candidate::{SegmentDomain, MAX_SEGMENTS, MIN_SEGMENTS},
    error::{EvolveError, Result},
    oracle::{OracleSettings, Shape},
};

/// Default probability that an offspring is redrawn instead of crossed over.
pub const DEFAULT_MUTATION_RATE: f64 = 0.1;
/// Default wall-clock budget of one oracle call.
pub const DEFAULT_EVALUATION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How much per-candidate progress the controller logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogLevel {
    /// Every evaluation result with its full loss trace.
    Verbose,
    /// Generation summaries and the final loss of every evaluation.
    #[default]
    Minimal,
    /// Nothing from the generation loop.
    None,
}

impl LogLevel {
    /// Whether generation starts and summaries are logged.
    pub fn reports_generations(self) -> bool {
        self != LogLevel::None
    }

    /// Whether each evaluation's final loss is logged as it completes.
    pub fn reports_candidates(self) -> bool {
        self != LogLevel::None
    }

    /// Whether each evaluation's loss trace is logged too.
    pub fn reports_traces(self) -> bool {
        self == LogLevel::Verbose
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    oracle: OracleSettings,
    generation_count: usize,
    population_size: usize,
    mutation_rate: f64,
    segment_domain: SegmentDomain,
    workers: usize,
    evaluation_timeout: Duration,
    seed: Option<u64>,
    log_level: LogLevel,
}

/// Number of evaluation workers used when none is configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl RunConfig {
    /// Starts a builder with every field at its default.
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// Parses the positional command line form.
    ///
    /// Exactly six arguments are expected:
    /// `<run_mode> <shape> <iterations> <path> <generations> <population_size>`.
    /// Everything not given on the command line keeps its default.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
        if args.len() != 6 {
            return Err(EvolveError::Configuration(format!(
                "Expected 6 arguments, got {}",
                args.len()
            )));
        }

        Self::builder()
            .run_mode(&args[0])
            .shape(args[1].parse()?)
            .iterations(parse_number(&args[2], "iterations")?)
            .path(&args[3])
            .generation_count(parse_number(&args[4], "generations")?)
            .population_size(parse_number(&args[5], "population_size")?)
            .build()
    }

    /// Checks every constraint a run relies on.
    ///
    /// # Errors
    ///
    /// Returns `EvolveError::Configuration` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.generation_count == 0 {
            return Err(EvolveError::Configuration(
                "Generation count cannot be zero".to_string(),
            ));
        }
        if self.population_size == 0 {
            return Err(EvolveError::Configuration(
                "Population size cannot be zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(EvolveError::Configuration(format!(
                "Mutation rate {} is outside [0, 1]",
                self.mutation_rate
            )));
        }
        if self.oracle.iterations == 0 {
            return Err(EvolveError::Configuration(
                "Iterations cannot be zero".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(EvolveError::Configuration(
                "Worker count cannot be zero".to_string(),
            ));
        }
        if self.evaluation_timeout.is_zero() {
            return Err(EvolveError::Configuration(
                "Evaluation timeout cannot be zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings forwarded unchanged to every oracle call.
    pub fn oracle_settings(&self) -> &OracleSettings {
        &self.oracle
    }

    /// Number of generations evaluated; there is no early stop.
    pub fn generation_count(&self) -> usize {
        self.generation_count
    }

    /// Candidates per generation.
    pub fn population_size(&self) -> usize {
        self.population_size
    }

    /// Probability that an offspring is redrawn from the domain.
    pub fn mutation_rate(&self) -> f64 {
        self.mutation_rate
    }

    /// The inclusive range candidates are drawn from.
    pub fn segment_domain(&self) -> SegmentDomain {
        self.segment_domain
    }

    /// Maximum number of concurrent oracle calls.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Wall-clock budget of one oracle call.
    pub fn evaluation_timeout(&self) -> Duration {
        self.evaluation_timeout
    }

    /// Seed of the run's random generator; `None` draws from entropy.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// How much progress the generation loop logs.
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn set_seed(&mut self, seed: Option<u64>) {
        self.seed = seed;
    }

    pub fn set_log_level(&mut self, log_level: LogLevel) {
        self.log_level = log_level;
    }

    pub fn set_workers(&mut self, workers: usize) {
        self.workers = workers;
    }

    pub fn set_evaluation_timeout(&mut self, timeout: Duration) {
        self.evaluation_timeout = timeout;
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            oracle: OracleSettings::default(),
            generation_count: 10,
            population_size: 10,
            mutation_rate: DEFAULT_MUTATION_RATE,
            segment_domain: SegmentDomain::default(),
            workers: default_workers(),
            evaluation_timeout: DEFAULT_EVALUATION_TIMEOUT,
            seed: None,
            log_level: LogLevel::Minimal,
        }
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, name: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| {
        EvolveError::Configuration(format!("Invalid {} '{}': {}", name, value, e))
    })
}

/// Builder for `RunConfig`.
///
/// Unset fields fall back to the `RunConfig` defaults; `build` validates the
/// result.
#[derive(Debug, Clone, Default)]
pub struct RunConfigBuilder {
    run_mode: Option<String>,
    shape: Option<Shape>,
    iterations: Option<u32>,
    path: Option<String>,
    generation_count: Option<usize>,
    population_size: Option<usize>,
    mutation_rate: Option<f64>,
    segment_domain: Option<(u32, u32)>,
    workers: Option<usize>,
    evaluation_timeout: Option<Duration>,
    seed: Option<u64>,
    log_level: Option<LogLevel>,
}

impl RunConfigBuilder {
    pub fn run_mode(mut self, value: impl Into<String>) -> Self {
        self.run_mode = Some(value.into());
        self
    }

    pub fn shape(mut self, value: Shape) -> Self {
        self.shape = Some(value);
        self
    }

    pub fn iterations(mut self, value: u32) -> Self {
        self.iterations = Some(value);
        self
    }

    pub fn path(mut self, value: impl Into<String>) -> Self {
        self.path = Some(value.into());
        self
    }

    pub fn generation_count(mut self, value: usize) -> Self {
        self.generation_count = Some(value);
        self
    }

    pub fn population_size(mut self, value: usize) -> Self {
        self.population_size = Some(value);
        self
    }

    pub fn mutation_rate(mut self, value: f64) -> Self {
        self.mutation_rate = Some(value);
        self
    }

    /// Sets the inclusive segment domain `[min, max]`.
    pub fn segment_domain(mut self, min: u32, max: u32) -> Self {
        self.segment_domain = Some((min, max));
        self
    }

    pub fn workers(mut self, value: usize) -> Self {
        self.workers = Some(value);
        self
    }

    pub fn evaluation_timeout(mut self, value: Duration) -> Self {
        self.evaluation_timeout = Some(value);
        self
    }

    pub fn seed(mut self, value: u64) -> Self {
        self.seed = Some(value);
        self
    }

    pub fn log_level(mut self, value: LogLevel) -> Self {
        self.log_level = Some(value);
        self
    }

    /// Builds and validates the `RunConfig`.
    pub fn build(self) -> Result<RunConfig> {
        let defaults = OracleSettings::default();
        let (min, max) = self.segment_domain.unwrap_or((MIN_SEGMENTS, MAX_SEGMENTS));

        let config = RunConfig {
            oracle: OracleSettings {
                run_mode: self.run_mode.unwrap_or(defaults.run_mode),
                shape: self.shape.unwrap_or(defaults.shape),
                iterations: self.iterations.unwrap_or(defaults.iterations),
                path: self.path.unwrap_or(defaults.path),
            },
            generation_count: self.generation_count.unwrap_or(10),
            population_size: self.population_size.unwrap_or(10),
            mutation_rate: self.mutation_rate.unwrap_or(DEFAULT_MUTATION_RATE),
            segment_domain: SegmentDomain::new(min, max)?,
            workers: self.workers.unwrap_or_else(default_workers),
            evaluation_timeout: self
                .evaluation_timeout
                .unwrap_or(DEFAULT_EVALUATION_TIMEOUT),
            seed: self.seed,
            log_level: self.log_level.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}
