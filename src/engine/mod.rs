//! Engine module - filesystem side of an invocation
//!
//! It handles:
//! - Workspace creation and guaranteed removal
//! - Artifact enumeration and encoding

pub mod artifacts;
pub mod workspace;

pub use artifacts::{collect_artifacts, ArtifactNaming, Collected};
pub use workspace::Workspace;
