//! Request validation
//!
//! Turns a raw invocation event into the code string to execute. Accepted shapes:
//! - `{ "body": "<json string>" }` (body is parsed as JSON)
//! - `{ "body": { "code": ... } }`
//! - `{ "code": ... }` (direct invocation)

use serde_json::{Map, Value};

use super::error::InvocationError;

/// A request that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub code: String,
}

/// Validate an invocation event and extract the code to run
pub fn parse_request(event: &Value) -> Result<InvocationRequest, InvocationError> {
    let event = event
        .as_object()
        .ok_or_else(|| InvocationError::InvalidRequest("event must be a JSON object".into()))?;

    match event.get("body") {
        Some(Value::String(raw)) => {
            let parsed: Value = serde_json::from_str(raw)
                .map_err(|e| InvocationError::MalformedBody(e.to_string()))?;
            match parsed {
                Value::Object(body) => extract_code(&body),
                _ => Err(InvocationError::InvalidRequest(
                    "body must decode to a JSON object".into(),
                )),
            }
        }
        Some(Value::Object(body)) => extract_code(body),
        Some(_) => Err(InvocationError::InvalidRequest(
            "body must be a JSON string or object".into(),
        )),
        None => extract_code(event),
    }
}

/// Parse a raw transport payload (e.g. an HTTP body) as an event first
pub fn parse_request_bytes(payload: &[u8]) -> Result<InvocationRequest, InvocationError> {
    let event: Value = serde_json::from_slice(payload)
        .map_err(|e| InvocationError::MalformedBody(e.to_string()))?;
    parse_request(&event)
}

fn extract_code(body: &Map<String, Value>) -> Result<InvocationRequest, InvocationError> {
    match body.get("code") {
        Some(Value::String(code)) if !code.is_empty() => Ok(InvocationRequest {
            code: code.clone(),
        }),
        Some(Value::String(_)) | Some(Value::Null) | None => Err(InvocationError::MissingCode),
        Some(_) => Err(InvocationError::InvalidRequest(
            "'code' must be a string".into(),
        )),
    }
}
