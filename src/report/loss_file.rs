//! A sink writing the run's loss traces and summary to a directory.
//!
//! Two files are written when the run finishes:
//!
//! - `generation_losses_<path>_<shape>_<stamp>.txt`: one comma-separated loss
//!   trace per successful evaluation, generations separated by a blank line,
//! - `run_summary_<path>_<shape>_<stamp>.json`: best and modal candidates plus
//!   the grouped loss series.

use std::{
    collections::BTreeMap,
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Serialize;
use tracing::info;

use super::{ReportingSink, RunReport};
use crate::{
    error::{Result, ResultExt},
    oracle::OracleSettings,
    population::Generation,
};

#[derive(Debug, Clone)]
pub struct LossFileSink {
    directory: PathBuf,
    stem: String,
    written: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    generations: usize,
    best_segments: Option<u32>,
    best_generation: Option<usize>,
    /// `None` when every evaluation failed.
    best_loss: Option<f64>,
    modal_segments: Option<u32>,
    final_population: &'a [u32],
    average_trace_by_segments: BTreeMap<u32, Vec<f64>>,
    population_distribution: BTreeMap<u32, Vec<usize>>,
    mean_final_loss_per_generation: Vec<Option<f64>>,
}

impl LossFileSink {
    /// Creates a sink naming its files after the run's path and shape and the
    /// current time.
    pub fn new(directory: impl AsRef<Path>, settings: &OracleSettings) -> Self {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::with_stem(
            directory,
            format!("{}_{}_{}", settings.path, settings.shape, stamp),
        )
    }

    /// Creates a sink with a fixed file name stem.
    pub fn with_stem(directory: impl AsRef<Path>, stem: impl Into<String>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            stem: stem.into(),
            written: Vec::new(),
        }
    }

    /// Where the loss traces are written.
    pub fn losses_path(&self) -> PathBuf {
        self.directory
            .join(format!("generation_losses_{}.txt", self.stem))
    }

    /// Where the JSON summary is written.
    pub fn summary_path(&self) -> PathBuf {
        self.directory.join(format!("run_summary_{}.json", self.stem))
    }

    /// Files written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write_losses(&self, generations: &[Generation]) -> Result<()> {
        let file = fs::File::create(self.losses_path()).context("Failed to create loss file")?;
        let mut out = BufWriter::new(file);
        for generation in generations {
            for result in generation.results().iter().filter(|r| !r.is_failed()) {
                let line: Vec<String> = result.loss_trace().iter().map(f64::to_string).collect();
                writeln!(out, "{}", line.join(","))?;
            }
            writeln!(out)?;
        }
        out.flush()?;
        Ok(())
    }

    fn write_summary(&self, report: &RunReport) -> Result<()> {
        let best_loss = report.best_loss();
        let summary = RunSummary {
            generations: report.history().len(),
            best_segments: report.best_candidate().map(|c| c.segments()),
            best_generation: report.best_candidate().map(|c| c.generation()),
            best_loss: best_loss.is_finite().then_some(best_loss),
            modal_segments: report.modal_segments(),
            final_population: report.final_population(),
            average_trace_by_segments: report.average_trace_by_segments(),
            population_distribution: report.population_distribution(),
            mean_final_loss_per_generation: report.mean_final_loss_per_generation(),
        };

        let file =
            fs::File::create(self.summary_path()).context("Failed to create summary file")?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, &summary)?;
        out.flush()?;
        Ok(())
    }
}

impl ReportingSink for LossFileSink {
    fn finish(&mut self, report: &RunReport) -> Result<()> {
        fs::create_dir_all(&self.directory).context("Failed to create report directory")?;

        self.write_losses(report.history().generations())?;
        self.write_summary(report)?;

        self.written = vec![self.losses_path(), self.summary_path()];
        info!(directory = %self.directory.display(), "saved generation losses and run summary");
        Ok(())
    }
}
