//! # Reporting
//!
//! A run hands its progress and final aggregate to a [`ReportingSink`]. The
//! sink decides how to persist or display it; this module only shapes the data.
//!
//! The series helpers group losses by segment count with ordered maps built
//! from the run history, so two reports of the same history are identical.

pub mod loss_file;

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::{
    candidate::{Candidate, EvaluationResult},
    error::Result,
    population::{Generation, RunHistory},
};

pub use loss_file::LossFileSink;

/// Receives a run's progress and its final report.
pub trait ReportingSink {
    /// Called once per generation, right after all of its results are in.
    fn generation_completed(&mut self, _generation: &Generation) -> Result<()> {
        Ok(())
    }

    /// Called once, after the last generation.
    fn finish(&mut self, report: &RunReport) -> Result<()>;
}

/// Keeps everything it is given in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub generations: Vec<Generation>,
    pub report: Option<RunReport>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportingSink for MemorySink {
    fn generation_completed(&mut self, generation: &Generation) -> Result<()> {
        self.generations.push(generation.clone());
        Ok(())
    }

    fn finish(&mut self, report: &RunReport) -> Result<()> {
        self.report = Some(report.clone());
        Ok(())
    }
}

/// The final aggregate of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    history: RunHistory,
    best: Option<EvaluationResult>,
    final_population: Vec<u32>,
    modal_segments: Option<u32>,
}

impl RunReport {
    /// Summarises `history`. `final_population` is the candidate set bred from
    /// the last evaluated generation.
    pub fn new(history: RunHistory, final_population: Vec<u32>) -> Self {
        let best = history.best_overall().cloned();
        let modal_segments = modal_value(&final_population);
        Self {
            history,
            best,
            final_population,
            modal_segments,
        }
    }

    /// Every completed generation of the run.
    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    /// The lowest-loss candidate across every generation, if any evaluation
    /// succeeded.
    pub fn best_candidate(&self) -> Option<Candidate> {
        self.best.as_ref().map(EvaluationResult::candidate)
    }

    /// Loss of the best candidate; `+inf` when every evaluation failed.
    pub fn best_loss(&self) -> f64 {
        self.best
            .as_ref()
            .map_or(f64::INFINITY, EvaluationResult::loss)
    }

    /// The full result of the best candidate, trace included.
    pub fn best(&self) -> Option<&EvaluationResult> {
        self.best.as_ref()
    }

    /// Segment counts bred from the last evaluated generation.
    pub fn final_population(&self) -> &[u32] {
        &self.final_population
    }

    /// The most frequent segment count of the final population.
    pub fn modal_segments(&self) -> Option<u32> {
        self.modal_segments
    }

    /// See [`average_trace_by_segments`].
    pub fn average_trace_by_segments(&self) -> BTreeMap<u32, Vec<f64>> {
        average_trace_by_segments(&self.history)
    }

    /// See [`population_distribution`].
    pub fn population_distribution(&self) -> BTreeMap<u32, Vec<usize>> {
        population_distribution(&self.history)
    }

    /// See [`mean_final_loss_per_generation`].
    pub fn mean_final_loss_per_generation(&self) -> Vec<Option<f64>> {
        mean_final_loss_per_generation(&self.history)
    }
}

/// The most frequent value; the first one encountered wins ties.
pub fn modal_value(values: &[u32]) -> Option<u32> {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for &v in values {
        *counts.entry(v).or_insert(0) += 1;
    }

    let mut modal: Option<(u32, usize)> = None;
    for &v in values {
        let count = counts[&v];
        if modal.map_or(true, |(_, best)| count > best) {
            modal = Some((v, count));
        }
    }
    modal.map(|(v, _)| v)
}

/// Element-wise mean of the successful loss traces of each segment count.
///
/// Traces of one segment count are averaged per iteration and cut to the
/// shortest trace. Segment counts that never evaluated successfully are absent.
pub fn average_trace_by_segments(history: &RunHistory) -> BTreeMap<u32, Vec<f64>> {
    let mut grouped: BTreeMap<u32, Vec<&[f64]>> = BTreeMap::new();
    for result in history.generations().iter().flat_map(Generation::results) {
        if !result.is_failed() {
            grouped
                .entry(result.candidate().segments())
                .or_default()
                .push(result.loss_trace());
        }
    }

    grouped
        .into_iter()
        .map(|(segments, traces)| {
            let len = traces.iter().map(|t| t.len()).min().unwrap_or(0);
            let n = traces.len() as f64;
            let mean = (0..len)
                .map(|i| traces.iter().map(|t| t[i]).sum::<f64>() / n)
                .collect();
            (segments, mean)
        })
        .collect()
}

/// How many candidates of each segment count every generation held.
pub fn population_distribution(history: &RunHistory) -> BTreeMap<u32, Vec<usize>> {
    let generations = history.len();
    let mut counts: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (index, generation) in history.generations().iter().enumerate() {
        for candidate in generation.candidates() {
            counts
                .entry(candidate.segments())
                .or_insert_with(|| vec![0; generations])[index] += 1;
        }
    }
    counts
}

/// Mean final loss of the successful evaluations of each generation.
pub fn mean_final_loss_per_generation(history: &RunHistory) -> Vec<Option<f64>> {
    history
        .generations()
        .iter()
        .map(|generation| {
            let losses: Vec<f64> = generation
                .results()
                .iter()
                .filter(|r| !r.is_failed())
                .map(EvaluationResult::loss)
                .collect();
            if losses.is_empty() {
                None
            } else {
                Some(losses.iter().sum::<f64>() / losses.len() as f64)
            }
        })
        .collect()
}
