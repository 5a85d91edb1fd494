//! An oracle backed by an external simulation program.
//!
//! Each call spawns one child process:
//!
//! ```text
//! <program> [prefix args...] <segments> <run_mode> <shape> <iterations> <path> <token>
//! ```
//!
//! On exit status 0 the last non-empty line of the child's stdout must be a
//! JSON record `{"token": "...", "robot_id": 3, "losses": [..]}`. Any other
//! exit status means the output is never read. A child still running when the
//! request timeout elapses is killed.

use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::debug;

use super::{FitnessOracle, OracleOutcome, OracleRecord, OracleRequest};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: PathBuf,
    prefix_args: Vec<String>,
    poll_interval: Duration,
}

impl CommandOracle {
    /// Creates an oracle running `program` with no prefix arguments.
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            prefix_args: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Arguments placed before the positional request arguments, e.g. a
    /// script path for an interpreter.
    pub fn with_prefix_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets how often a running child is checked for exit or cancellation.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// The program spawned for every call.
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn spawn(&self, request: &OracleRequest) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.prefix_args)
            .args(request.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

fn parse_record(stdout: &str) -> OracleOutcome {
    let Some(line) = stdout.lines().rev().find(|l| !l.trim().is_empty()) else {
        return OracleOutcome::Failed("oracle produced no result record".to_string());
    };

    match serde_json::from_str::<OracleRecord>(line.trim()) {
        Ok(record) => OracleOutcome::Completed(record),
        Err(e) => OracleOutcome::Failed(format!("malformed result record: {}", e)),
    }
}

impl FitnessOracle for CommandOracle {
    fn invoke(&self, request: &OracleRequest) -> OracleOutcome {
        let mut child = match self.spawn(request) {
            Ok(child) => child,
            Err(e) => {
                return OracleOutcome::Failed(format!(
                    "failed to spawn {}: {}",
                    self.program.display(),
                    e
                ))
            }
        };

        // Drain both pipes while waiting so a chatty child cannot block on a full pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let deadline = Instant::now() + request.timeout;

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if request.is_cancelled() || Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return OracleOutcome::Failed(format!(
                        "killed after {:?} without a result",
                        request.timeout
                    ));
                }
                Ok(None) => thread::sleep(self.poll_interval),
                Err(e) => {
                    let _ = child.kill();
                    return OracleOutcome::Failed(format!("lost track of child process: {}", e));
                }
            }
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            return OracleOutcome::Failed(format!("{}: {}", status, stderr.trim()));
        }

        debug!(segments = request.segments, bytes = stdout.len(), "oracle process exited");
        parse_record(&stdout)
    }
}
