/// Why a pushed status message was discarded.
///
/// Parse failures never close a subscription; the tracker logs them and
/// keeps listening.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Message carried no payload")]
    Empty,

    #[error("Invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("Missing status field")]
    MissingStatus,

    #[error("Unrecognised status: {0}")]
    UnknownStatus(String),

    /// The status was recognised but another field had the wrong type.
    #[error("Malformed status fields: {0}")]
    Malformed(serde_json::Error),
}
