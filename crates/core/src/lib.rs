//! Domain types for the jobstream client.
//!
//! Job and flow identifiers, the job status model pushed by the backend,
//! and the parser that turns one event-stream message into a
//! [`JobStatusEvent`](status::JobStatusEvent).

pub mod error;
pub mod frame;
pub mod job_events;
pub mod status;
pub mod types;

pub use error::ParseError;
pub use frame::parse_status_message;
pub use status::{JobStatus, JobStatusEvent};
pub use types::{FlowId, JobId, Timestamp};
