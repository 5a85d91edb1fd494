use tracing::{debug, error, info};

use super::{
    dispatcher::EvaluationDispatcher,
    options::RunConfig,
};
use crate::{
    error::Result,
    oracle::{FitnessOracle, FitnessOracleClient},
    population::{Generation, Population, RunHistory},
    report::{ReportingSink, RunReport},
    rng::RandomNumberGenerator,
    selection::{BreedStrategy, TruncationBreeder},
};

/// Where a run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initializing,
    Running(usize),
    Finalizing,
    Done,
}

/// Drives the generation loop of one search.
///
/// Each run evaluates `generation_count` generations, appends each to the run
/// history, and breeds the next population from it. There is no early stop and
/// no resume; a run either finishes or fails with the index of the generation
/// it was in.
pub struct EvolutionController<O, B = TruncationBreeder> {
    config: RunConfig,
    dispatcher: EvaluationDispatcher<O>,
    breeder: B,
    state: RunState,
}

impl<O> EvolutionController<O, TruncationBreeder>
where
    O: FitnessOracle + 'static,
{
    /// Creates a controller using truncation breeding at the configured
    /// mutation rate.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the worker pool cannot be
    /// started. Nothing is evaluated in either case.
    pub fn new(config: RunConfig, oracle: O) -> Result<Self> {
        config.validate()?;
        let breeder = TruncationBreeder::new(config.mutation_rate())?;
        Self::with_breeder(config, oracle, breeder)
    }
}

impl<O, B> EvolutionController<O, B>
where
    O: FitnessOracle + 'static,
    B: BreedStrategy,
{
    /// Creates a controller breeding with `breeder`.
    ///
    /// # Errors
    ///
    /// Same as [`EvolutionController::new`].
    pub fn with_breeder(config: RunConfig, oracle: O, breeder: B) -> Result<Self> {
        config.validate()?;
        let client = FitnessOracleClient::new(
            oracle,
            config.oracle_settings().clone(),
            config.evaluation_timeout(),
        )
        .with_abandoned_limit(config.workers());
        let dispatcher = EvaluationDispatcher::new(client, config.workers())?;

        Ok(Self {
            config,
            dispatcher,
            breeder,
            state: RunState::Initializing,
        })
    }

    /// The configuration this controller runs with.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Where the current or last run stands.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Runs the search with a generator seeded from the configuration, or
    /// from entropy when no seed is set.
    pub fn run<S>(&mut self, sink: &mut S) -> Result<RunReport>
    where
        S: ReportingSink + ?Sized,
    {
        let mut rng = match self.config.seed() {
            Some(seed) => RandomNumberGenerator::from_seed(seed),
            None => RandomNumberGenerator::new(),
        };
        self.run_with_rng(&mut rng, sink)
    }

    /// Runs the search drawing every random decision from `rng`.
    ///
    /// Each completed generation is passed to `sink` as soon as its results
    /// are in; the final report is passed once all generations are done. On a
    /// fatal error the sink never sees the incomplete generation.
    pub fn run_with_rng<S>(
        &mut self,
        rng: &mut RandomNumberGenerator,
        sink: &mut S,
    ) -> Result<RunReport>
    where
        S: ReportingSink + ?Sized,
    {
        self.state = RunState::Initializing;
        let total = self.config.generation_count();
        let size = self.config.population_size();
        let domain = self.config.segment_domain();

        let mut population = Population::initialize(size, domain, rng)?;
        let mut history = RunHistory::new();

        for generation in 0..total {
            self.state = RunState::Running(generation);
            if let Err(e) = self.step(&mut population, &mut history, rng, sink) {
                let e = e.in_generation(generation);
                error!(generation, error = %e, "run aborted");
                return Err(e);
            }
        }

        self.state = RunState::Finalizing;
        let report = RunReport::new(history, population.segments());
        match report.best() {
            Some(best) => info!(
                segments = best.candidate().segments(),
                generation = best.candidate().generation(),
                loss = best.loss(),
                modal = ?report.modal_segments(),
                "search finished"
            ),
            None => info!("search finished without a single successful evaluation"),
        }
        sink.finish(&report)?;

        self.state = RunState::Done;
        Ok(report)
    }

    fn step<S>(
        &self,
        population: &mut Population,
        history: &mut RunHistory,
        rng: &mut RandomNumberGenerator,
        sink: &mut S,
    ) -> Result<()>
    where
        S: ReportingSink + ?Sized,
    {
        let index = population.index();
        let log_level = self.config.log_level();

        if log_level.reports_generations() {
            info!(
                generation = index + 1,
                of = self.config.generation_count(),
                candidates = ?population.segments(),
                "evaluating generation"
            );
        }

        let results = self
            .dispatcher
            .evaluate_all_with_progress(population.candidates(), |position, result| {
                if log_level.reports_traces() {
                    info!(
                        generation = index + 1,
                        position,
                        segments = result.candidate().segments(),
                        loss = result.loss(),
                        trace = ?result.loss_trace(),
                        "candidate evaluated"
                    );
                } else if log_level.reports_candidates() {
                    info!(
                        generation = index + 1,
                        position,
                        segments = result.candidate().segments(),
                        loss = result.loss(),
                        "candidate evaluated"
                    );
                }
            });

        let generation = population.complete(results)?;
        if log_level.reports_generations() {
            let best = generation.best().map(|r| (r.candidate().segments(), r.loss()));
            info!(
                generation = index + 1,
                failures = generation.failure_count(),
                best = ?best,
                "generation complete"
            );
        }
        sink.generation_completed(&generation)?;
        history.push(generation);

        let latest = history.last().map(Generation::results).unwrap_or_default();
        let next = self.breeder.select_and_breed(
            latest,
            self.config.population_size(),
            &self.config.segment_domain(),
            rng,
        )?;
        debug!(generation = index + 1, next = ?next, "bred next population");

        *population = population.replace(next)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use crate::{
        error::EvolveError,
        evolution::options::LogLevel,
        oracle::{OracleOutcome, OracleRecord, OracleRequest},
        report::MemorySink,
    };

    struct DistanceToSix;

    impl FitnessOracle for DistanceToSix {
        fn invoke(&self, request: &OracleRequest) -> OracleOutcome {
            let loss = (request.segments as f64 - 6.0).abs();
            OracleOutcome::Completed(OracleRecord::new(&request.token, vec![loss + 1.0, loss]))
        }
    }

    struct RejectingSink;

    impl ReportingSink for RejectingSink {
        fn generation_completed(&mut self, generation: &Generation) -> Result<()> {
            if generation.index() == 1 {
                return Err(EvolveError::Report("disk full".to_string()));
            }
            Ok(())
        }

        fn finish(&mut self, _report: &RunReport) -> Result<()> {
            panic!("finish must not be reached");
        }
    }

    fn config() -> RunConfig {
        RunConfig::builder()
            .segment_domain(4, 8)
            .population_size(4)
            .generation_count(3)
            .workers(2)
            .seed(17)
            .build()
            .unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let mut controller = EvolutionController::new(config(), DistanceToSix).unwrap();
        assert_eq!(controller.state(), RunState::Initializing);

        let mut sink = MemorySink::new();
        let report = controller.run(&mut sink).unwrap();

        assert_eq!(controller.state(), RunState::Done);
        assert_eq!(report.history().len(), 3);
        assert_eq!(sink.generations.len(), 3);
        assert_eq!(report.final_population().len(), 4);
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logged_run(log_level: LogLevel) -> String {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let mut config = config();
        config.set_log_level(log_level);
        let mut controller = EvolutionController::new(config, DistanceToSix).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            controller.run(&mut MemorySink::new()).unwrap();
        });

        let bytes = log.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_minimal_logs_every_candidate_loss() {
        let out = logged_run(LogLevel::Minimal);
        assert_eq!(out.matches("candidate evaluated").count(), 4 * 3);
        assert!(out.contains("loss="));
        assert!(!out.contains("trace="));
    }

    #[test]
    fn test_verbose_logs_traces() {
        let out = logged_run(LogLevel::Verbose);
        assert_eq!(out.matches("candidate evaluated").count(), 4 * 3);
        assert!(out.contains("trace="));
    }

    #[test]
    fn test_none_logs_no_progress() {
        let out = logged_run(LogLevel::None);
        assert!(!out.contains("candidate evaluated"));
        assert!(!out.contains("evaluating generation"));
    }

    #[test]
    fn test_invalid_config_rejected_before_work() {
        let mut config = config();
        config.set_workers(0);
        assert!(matches!(
            EvolutionController::new(config, DistanceToSix),
            Err(EvolveError::Configuration(_))
        ));
    }

    #[test]
    fn test_sink_failure_reports_generation() {
        let mut controller = EvolutionController::new(config(), DistanceToSix).unwrap();
        let err = controller.run(&mut RejectingSink).unwrap_err();
        match err {
            EvolveError::Generation { generation, reason } => {
                assert_eq!(generation, 1);
                assert!(reason.contains("disk full"));
            }
            other => panic!("Expected Generation error, got {:?}", other),
        }
        assert_eq!(controller.state(), RunState::Running(1));
    }
}
