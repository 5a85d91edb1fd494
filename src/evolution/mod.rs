pub mod controller;
pub mod dispatcher;
pub mod options;

pub use controller::{EvolutionController, RunState};
pub use dispatcher::EvaluationDispatcher;
pub use options::{LogLevel, RunConfig, RunConfigBuilder};
