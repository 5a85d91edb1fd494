//! # Error Types
//!
//! This module defines the error type shared by every stage of a run. Only
//! fatal conditions live here: a failing fitness evaluation is an ordinary
//! outcome and is recorded as a failed [`EvaluationResult`](crate::candidate::EvaluationResult)
//! instead.
//!
//! ## Examples
//!
//! Using the `ResultExt` trait to add context to errors:
//!
//! ```rust
//! use morphevo::error::{Result, ResultExt};
//! use std::fs::File;
//!
//! fn open_report(path: &str) -> Result<()> {
//!     File::open(path).context("Failed to open report file")?;
//!     Ok(())
//! }
//! ```


use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Represents the fatal errors that can abort a run.
#[derive(Error, Debug)]
pub enum EvolveError {
    /// Error that occurs when an invalid run configuration is provided.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error that occurs when a candidate lies outside the segment domain.
    #[error("Bounds error: candidate is outside of the segment domain - {0}")]
    OutOfBounds(String),

    /// Error that occurs when an empty population is encountered.
    #[error("Empty population error: Cannot operate on an empty population")]
    EmptyPopulation,

    /// Error that occurs when the evaluation worker pool cannot be provisioned.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// Error raised inside the generation loop, tagged with the failing generation.
    #[error("Generation {generation} failed: {reason}")]
    Generation { generation: usize, reason: String },

    /// Error that occurs when an oracle cannot be set up at all.
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// Error that occurs when the reporting sink rejects a report.
    #[error("Report error: {0}")]
    Report(String),

    /// Error that occurs when an I/O operation fails.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error that occurs when a report cannot be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A generic error with a custom message.
    #[error("{0}")]
    Other(String),
}

impl EvolveError {
    /// Tags this error with the generation it aborted.
    ///
    /// Errors that already carry a generation index are returned unchanged.
    pub fn in_generation(self, generation: usize) -> Self {
        match self {
            err @ EvolveError::Generation { .. } => err,
            other => EvolveError::Generation {
                generation,
                reason: other.to_string(),
            },
        }
    }
}

/// A specialized Result type for evolution operations.
pub type Result<T> = std::result::Result<T, EvolveError>;

/// Extension trait for Result to add context to errors.
pub trait ResultExt<T, E> {
    /// Adds context to an error, converting it to an `EvolveError`.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display + Send + Sync + 'static;
}

impl<T, E> ResultExt<T, E> for std::result::Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| EvolveError::Other(format!("{}: {}", context, e)))
    }
}
