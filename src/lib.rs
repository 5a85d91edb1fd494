pub mod candidate;
pub mod error;
pub mod evolution;
pub mod oracle;
pub mod population;
pub mod report;
pub mod rng;
pub mod selection;

// Re-export commonly used types for convenience
pub use candidate::{Candidate, EvaluationResult, SegmentDomain};
pub use error::{EvolveError, Result, ResultExt};
pub use evolution::{EvolutionController, RunConfig};
pub use oracle::{CommandOracle, FitnessOracle, FitnessOracleClient};
pub use report::{ReportingSink, RunReport};
