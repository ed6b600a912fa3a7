//! Status message parser.
//!
//! Each pushed message carries one JSON-encoded [`JobStatusEvent`]. Some
//! servers wrap it in a second line-oriented `data:` frame inside the event
//! body; others send the JSON as the body itself. Both are accepted.

use serde_json::Value;

use crate::error::ParseError;
use crate::status::{JobStatus, JobStatusEvent};

/// Parse one status message body into a normalised event.
///
/// Returns `Err` for empty bodies, malformed JSON, non-object payloads and
/// payloads without a recognised `status`. Callers log the error and keep
/// listening.
pub fn parse_status_message(body: &str) -> Result<JobStatusEvent, ParseError> {
    let payload = strip_data_prefix(body);
    if payload.is_empty() {
        return Err(ParseError::Empty);
    }

    let value: Value = serde_json::from_str(payload).map_err(ParseError::InvalidJson)?;
    check_status(&value)?;

    let event: JobStatusEvent = serde_json::from_value(value).map_err(ParseError::Malformed)?;
    Ok(event.normalized())
}

/// Return the JSON part of a message body.
///
/// When any line starts with `data:`, the remainder of the first such line
/// (minus one leading space) is the payload. Otherwise the whole body is.
pub fn strip_data_prefix(body: &str) -> &str {
    body.lines()
        .find_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .unwrap_or(body)
        .trim()
}

fn check_status(value: &Value) -> Result<(), ParseError> {
    let object = value
        .as_object()
        .ok_or_else(|| ParseError::NotAnObject(json_type_name(value)))?;

    match object.get("status") {
        None | Some(Value::Null) => Err(ParseError::MissingStatus),
        Some(Value::String(name)) if JobStatus::parse(name).is_some() => Ok(()),
        Some(Value::String(name)) => Err(ParseError::UnknownStatus(name.clone())),
        Some(other) => Err(ParseError::UnknownStatus(other.to_string())),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
