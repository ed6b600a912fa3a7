//! Status stream sources.
//!
//! A [`StatusSource`] opens one live, server-pushed subscription for a job
//! and hands back a [`StatusStream`] of decoded event-stream events.
//! Dropping the stream closes the subscription. [`HttpStatusSource`] is
//! the production implementation; tests substitute in-memory sources.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use jobstream_core::JobId;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Url;

use crate::credentials::{authorize, CredentialProvider};
use crate::sse::{LineTooLong, SseDecoder, SseEvent};

/// Path segments of the status stream endpoint, before the job id.
const STREAM_PATH: [&str; 2] = ["queue", "job-status-stream"];

/// Live stream of events for one job.
///
/// Yields `Err` when the connection fails; ends when the peer closes it.
pub type StatusStream = BoxStream<'static, Result<SseEvent, TransportError>>;

/// Connection-level failures of a status subscription.
///
/// These mean the client cannot currently tell what happened to the job,
/// as opposed to an authoritative `failed` status from the server.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request or body read failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered the subscription with a non-2xx status.
    #[error("Status stream returned HTTP {0}")]
    Status(u16),

    #[error("Cannot build status stream URL: {0}")]
    InvalidUrl(String),

    /// The body could not be decoded as an event stream.
    #[error("Malformed event stream: {0}")]
    Decode(#[from] LineTooLong),

    /// The server closed the stream before a terminal status arrived.
    #[error("Status stream closed by server")]
    Closed,
}

/// Opens status subscriptions for jobs.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn open(&self, job_id: &JobId) -> Result<StatusStream, TransportError>;
}

/// Status source backed by an HTTP event stream.
///
/// Subscribes with `GET {base_url}/queue/job-status-stream/{job_id}`.
pub struct HttpStatusSource {
    client: reqwest::Client,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpStatusSource {
    /// * `client`      - should have no overall request timeout, since
    ///   streams stay open for as long as the job runs.
    /// * `base_url`    - queue API base URL.
    /// * `credentials` - bearer token source for the subscription request.
    pub fn new(
        client: reqwest::Client,
        base_url: Url,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            client,
            base_url,
            credentials,
        }
    }

    /// Subscription URL for a job. The id is percent-encoded as a single
    /// path segment.
    pub fn stream_url(&self, job_id: &JobId) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::InvalidUrl(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(STREAM_PATH)
            .push(job_id.as_str());
        Ok(url)
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn open(&self, job_id: &JobId) -> Result<StatusStream, TransportError> {
        let url = self.stream_url(job_id)?;

        let request = self
            .client
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        let response = authorize(request, self.credentials.as_ref())
            .await
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        tracing::info!(job_id = %job_id, url = %url, "Opened job status stream");
        Ok(event_stream(response))
    }
}

/// Read state threaded through [`futures::stream::unfold`].
struct BodyReader {
    response: reqwest::Response,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
    failed: bool,
}

/// Turn a streaming response body into decoded events.
fn event_stream(response: reqwest::Response) -> StatusStream {
    let reader = BodyReader {
        response,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        failed: false,
    };

    Box::pin(futures::stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(event) = reader.pending.pop_front() {
                return Some((Ok(event), reader));
            }
            if reader.failed {
                return None;
            }
            match reader.response.chunk().await {
                Ok(Some(bytes)) => match reader.decoder.feed(&bytes) {
                    Ok(events) => reader.pending.extend(events),
                    Err(e) => {
                        reader.failed = true;
                        return Some((Err(TransportError::Decode(e)), reader));
                    }
                },
                Ok(None) => return None,
                Err(e) => {
                    reader.failed = true;
                    return Some((Err(TransportError::Request(e)), reader));
                }
            }
        }
    }))
}
