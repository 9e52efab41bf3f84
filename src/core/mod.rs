//! Core types - request validation, outcomes, errors and response shaping
//!
//! Nothing in here touches the filesystem or spawns processes.

pub mod error;
pub mod outcome;
pub mod request;
pub mod response;

// Re-exports for convenience
pub use error::InvocationError;
pub use outcome::{Artifact, Completion, ExecutionOutcome};
pub use request::{parse_request, InvocationRequest};
pub use response::{build_response, FilesFormat, InvocationResponse};
