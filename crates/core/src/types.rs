use std::fmt;

use serde::Serialize;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Opaque handle identifying one asynchronous backend job.
///
/// Issued by the job submission API and never interpreted by the client.
/// Equality is exact string match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Build a job id from server output or manual entry.
    ///
    /// Surrounding whitespace is trimmed. Returns `None` when nothing is
    /// left, which callers treat as "no job".
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        non_empty(raw.as_ref()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of a generated flow.
///
/// The flow API returns either a string or a number; both are normalised
/// to their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FlowId(String);

impl FlowId {
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        non_empty(raw.as_ref()).map(Self)
    }

    /// Normalise the `id` field of a flow record.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Self::new(s),
            serde_json::Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
