//! Event-stream kind names used by the job status stream.
//!
//! The backend has been observed to push status payloads either as plain
//! `message` events (with a `data:` line inside the body) or as named
//! `status` events carrying the JSON directly.

/// Default event type of an event-stream message with no `event:` field.
pub const EVENT_KIND_MESSAGE: &str = "message";

/// Named event carrying a status payload as bare JSON.
pub const EVENT_KIND_STATUS: &str = "status";

/// Whether events of this type carry job status payloads.
///
/// Anything else (keep-alives, custom server events) is ignored by the
/// tracker without being counted as a parse failure.
pub fn is_status_kind(kind: &str) -> bool {
    kind == EVENT_KIND_MESSAGE || kind == EVENT_KIND_STATUS
}
