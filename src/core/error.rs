//! Invocation error taxonomy
//!
//! Every failure that can end an invocation early is one of these variants.
//! Failures of the submitted code itself (non-zero exit) are NOT errors here:
//! they are carried in a successful response body.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvocationError {
    /// Transport body was a string that did not parse as JSON
    #[error("Request body is not valid JSON: {0}")]
    MalformedBody(String),

    /// Event or body has a shape we cannot read a request from
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No 'code' field provided in event")]
    MissingCode,

    /// Script file could not be written into the workspace
    #[error("Failed to write script file: {0}")]
    WorkspaceWriteFailure(#[source] std::io::Error),

    #[error("Script execution failed: {0}")]
    SpawnFailure(String),

    #[error("Script execution timed out")]
    TimedOut,

    #[error("Unexpected error: {0}")]
    InternalFault(String),
}

impl InvocationError {
    /// Transport status code for this failure
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }

    /// Whether the caller is to blame (request never reached execution)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            InvocationError::MalformedBody(_)
                | InvocationError::InvalidRequest(_)
                | InvocationError::MissingCode
        )
    }

    /// Short machine-readable kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            InvocationError::MalformedBody(_) => "malformed_body",
            InvocationError::InvalidRequest(_) => "invalid_request",
            InvocationError::MissingCode => "missing_code",
            InvocationError::WorkspaceWriteFailure(_) => "workspace_write_failure",
            InvocationError::SpawnFailure(_) => "spawn_failure",
            InvocationError::TimedOut => "timed_out",
            InvocationError::InternalFault(_) => "internal_fault",
        }
    }
}

impl From<anyhow::Error> for InvocationError {
    fn from(err: anyhow::Error) -> Self {
        InvocationError::InternalFault(format!("{:#}", err))
    }
}
