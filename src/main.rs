use std::{env, path::Path, process};

use morphevo::{
    evolution::{EvolutionController, LogLevel, RunConfig},
    oracle::CommandOracle,
    report::LossFileSink,
    EvolveError, Result,
};
use tracing::Level;

const USAGE: &str = "Usage: morphevo <run=para> <shape=wheel|circle> <iterations> <path=cos|sin|parabola> \
<generations> <population_size> [oracle command...]";

/// Oracle used when no command follows the positional arguments.
const DEFAULT_ORACLE: [&str; 2] = ["python", "rigid_body.py"];

fn log_level() -> Level {
    env::var("MORPHEVO_LOG")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(Level::INFO)
}

fn build_oracle(command: &[String]) -> Result<CommandOracle> {
    if let Some((program, args)) = command.split_first() {
        return Ok(CommandOracle::new(program).with_prefix_args(args.iter().cloned()));
    }

    let script = DEFAULT_ORACLE[1];
    if !Path::new(script).is_file() {
        return Err(EvolveError::Oracle(format!(
            "No oracle command given and {} not found in the working directory",
            script
        )));
    }
    Ok(CommandOracle::new(DEFAULT_ORACLE[0]).with_prefix_args([script]))
}

fn run(args: &[String]) -> Result<()> {
    let (positional, command) = args.split_at(6);
    let mut config = RunConfig::from_args(positional)?;
    if let Some(seed) = env::var("MORPHEVO_SEED").ok().and_then(|s| s.parse().ok()) {
        config.set_seed(Some(seed));
    }
    if matches!(log_level(), Level::DEBUG | Level::TRACE) {
        config.set_log_level(LogLevel::Verbose);
    }

    let results_dir = env::var("MORPHEVO_RESULTS").unwrap_or_else(|_| "results".to_string());
    let mut sink = LossFileSink::new(&results_dir, config.oracle_settings());

    let oracle = build_oracle(command)?;
    tracing::info!(
        oracle = %oracle.program().display(),
        generations = config.generation_count(),
        population_size = config.population_size(),
        workers = config.workers(),
        "starting search"
    );

    let mut controller = EvolutionController::new(config, oracle)?;
    let report = controller.run(&mut sink)?;

    match report.best_candidate() {
        Some(best) => println!(
            "Best segment count: {} with loss: {}",
            best.segments(),
            report.best_loss()
        ),
        None => println!("Every evaluation failed; no best segment count"),
    }
    if let Some(modal) = report.modal_segments() {
        println!("Most common segment count in the final population: {}", modal);
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(log_level())
        .with_thread_names(true)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 6 {
        eprintln!("{}", USAGE);
        process::exit(2);
    }

    if let Err(e) = run(&args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}
