use std::fmt;

/// How a single execution ended
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Process ran to completion with this exit code (non-zero included)
    Success(i32),
    /// Process could not be launched
    RuntimeFailure(String),
    /// Wall-clock deadline exceeded, process killed
    TimedOut,
}

impl Completion {
    /// Whether the submitted code actually ran to the end
    pub fn ran(&self) -> bool {
        matches!(self, Completion::Success(_))
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Success(code) => write!(f, "exited({})", code),
            Completion::RuntimeFailure(msg) => write!(f, "runtime_failure({})", msg),
            Completion::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// A file produced by the snippet, ready for transport
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Name reported to the caller (relative path or bare file name)
    pub name: String,
    /// File content as base64-encoded string
    pub content_base64: String,
}

/// Everything observed about one execution
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    pub completion: Completion,
    /// Filled by the artifact collector after the run
    pub produced_files: Vec<Artifact>,
}

impl ExecutionOutcome {
    pub fn new(stdout: String, stderr: String, completion: Completion) -> Self {
        Self {
            stdout,
            stderr,
            completion,
            produced_files: Vec::new(),
        }
    }

    /// Outcome of a run that never produced output
    pub fn without_output(completion: Completion) -> Self {
        Self::new(String::new(), String::new(), completion)
    }
}
