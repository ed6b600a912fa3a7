//! Client library for the job backend.
//!
//! Provides an event-stream decoder, the HTTP status stream source, the
//! live [`JobStatusTracker`](tracker::JobStatusTracker), wrappers for the
//! job, flow and file-metadata endpoints, password sign-in against the
//! auth service, and environment-based configuration.

pub mod api;
pub mod auth;
pub mod config;
pub mod credentials;
pub mod source;
pub mod sse;
pub mod tracker;
pub mod upload;

pub use api::{FlowApi, QueueApi, SubmissionError};
pub use auth::{AuthClient, AuthError, AuthSession};
pub use config::{ClientConfig, ConfigError};
pub use credentials::{AccessToken, Anonymous, CredentialProvider, StaticToken};
pub use source::{HttpStatusSource, StatusSource, StatusStream, TransportError};
pub use sse::{LineTooLong, SseDecoder, SseEvent};
pub use tracker::{
    JobStatusTracker, SessionState, TrackerCallbacks, TrackerSnapshot, CONNECTION_LOST,
};
pub use upload::{FileMetadata, UploadMetadata, UploadTarget};
