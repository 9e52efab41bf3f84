//! Response building
//!
//! Maps every terminal state of an invocation to a transport status and a
//! JSON body. The envelope follows the function-host proxy shape:
//! `{ "statusCode": 200, "body": "<json string>" }`.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use tracing::error;

use super::error::InvocationError;
use super::outcome::{Artifact, Completion, ExecutionOutcome};

/// `exit_code` reported when the code never executed
pub const NOT_EXECUTED_EXIT_CODE: i32 = -1;

/// Wire shape of the `files` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilesFormat {
    /// `{ "name": "<base64>", ... }`
    #[default]
    Map,
    /// `[{ "name": "...", "data": "<base64>" }, ...]`
    List,
}

/// Response envelope returned to the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// JSON-encoded `ResponseBody`
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub files: Files,
}

/// Artifacts in caller-visible order, serialized per `FilesFormat`
#[derive(Debug, Clone)]
pub struct Files {
    pub format: FilesFormat,
    pub artifacts: Vec<Artifact>,
}

impl Serialize for Files {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.format {
            FilesFormat::Map => {
                let mut map = serializer.serialize_map(Some(self.artifacts.len()))?;
                for artifact in &self.artifacts {
                    map.serialize_entry(&artifact.name, &artifact.content_base64)?;
                }
                map.end()
            }
            FilesFormat::List => {
                #[derive(Serialize)]
                struct Entry<'a> {
                    name: &'a str,
                    data: &'a str,
                }

                let mut seq = serializer.serialize_seq(Some(self.artifacts.len()))?;
                for artifact in &self.artifacts {
                    seq.serialize_element(&Entry {
                        name: &artifact.name,
                        data: &artifact.content_base64,
                    })?;
                }
                seq.end()
            }
        }
    }
}

impl InvocationResponse {
    fn new(status_code: u16, body: &ResponseBody) -> Self {
        let body = serde_json::to_string(body).unwrap_or_else(|e| {
            error!("Failed to serialize response body: {}", e);
            format!(
                r#"{{"error":"Unexpected error: {}","stdout":"","stderr":"","exit_code":-1,"files":{{}}}}"#,
                e.to_string().replace('"', "'")
            )
        });
        Self { status_code, body }
    }

    /// Parse the body back into JSON (used by transports and tests)
    pub fn body_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.body)
    }
}

/// Build the response for a rejected or failed invocation
pub fn error_response(err: &InvocationError, format: FilesFormat) -> InvocationResponse {
    let body = ResponseBody {
        error: Some(err.to_string()),
        stdout: String::new(),
        stderr: String::new(),
        exit_code: NOT_EXECUTED_EXIT_CODE,
        files: Files {
            format,
            artifacts: Vec::new(),
        },
    };
    InvocationResponse::new(err.status_code(), &body)
}

/// Build the response for whatever the pipeline produced
pub fn build_response(
    result: Result<ExecutionOutcome, InvocationError>,
    format: FilesFormat,
) -> InvocationResponse {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => return error_response(&err, format),
    };

    match outcome.completion {
        Completion::Success(exit_code) => {
            let body = ResponseBody {
                error: None,
                stdout: outcome.stdout,
                stderr: outcome.stderr,
                exit_code,
                files: Files {
                    format,
                    artifacts: outcome.produced_files,
                },
            };
            InvocationResponse::new(200, &body)
        }
        // Partial output of an interrupted run is discarded
        Completion::TimedOut => error_response(&InvocationError::TimedOut, format),
        Completion::RuntimeFailure(msg) => {
            error_response(&InvocationError::SpawnFailure(msg), format)
        }
    }
}
