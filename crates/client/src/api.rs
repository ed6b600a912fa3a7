//! REST wrappers for the job queue and flow/file endpoints.
//!
//! [`QueueApi`] triggers background jobs on the queue API and returns the
//! id to track. [`FlowApi`] creates flows and registers uploaded files on
//! the flow API. Both attach the caller's bearer token through the injected
//! [`CredentialProvider`].

use std::sync::Arc;

use jobstream_core::{FlowId, JobId};
use reqwest::Url;
use serde::Deserialize;

use crate::config::endpoint;
use crate::credentials::{authorize, CredentialProvider};
use crate::upload::FileMetadata;

/// Flow generation endpoint, relative to the flow API.
const GENERATE_FLOW_PATH: &str = "flow/generate-flow";
/// File metadata registration endpoint, relative to the flow API.
const FILE_METADATA_PATH: &str = "files/upload-file-metadata";

/// Errors from the job and flow endpoints.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("API error ({status}): {body}")]
    Api {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    #[error("Trigger response did not contain a job id")]
    MissingJobId,

    #[error("Flow response did not contain a flow id")]
    MissingFlowId,

    /// The endpoint needs a signed-in user and there is none.
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

/// Response of the trigger endpoint.
#[derive(Debug, Deserialize)]
struct TriggerResponse {
    #[serde(default)]
    job_id: Option<String>,
}

/// Response of the flow generation endpoint.
#[derive(Debug, Deserialize)]
struct GenerateFlowResponse {
    #[serde(default)]
    data: Vec<FlowRecord>,
}

#[derive(Debug, Deserialize)]
struct FlowRecord {
    #[serde(default)]
    id: serde_json::Value,
}

/// Client for the job queue API.
pub struct QueueApi {
    client: reqwest::Client,
    trigger_url: Url,
    credentials: Arc<dyn CredentialProvider>,
}

impl QueueApi {
    /// * `base_url`     - queue API base URL.
    /// * `trigger_path` - trigger endpoint relative to `base_url`.
    pub fn new(
        client: reqwest::Client,
        base_url: &Url,
        trigger_path: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, SubmissionError> {
        let trigger_url = endpoint(base_url, trigger_path).map_err(SubmissionError::InvalidUrl)?;
        Ok(Self {
            client,
            trigger_url,
            credentials,
        })
    }

    /// Ask the backend to start a job.
    ///
    /// Sends `POST {trigger_url}` and returns the `job_id` from the
    /// response body.
    pub async fn trigger_job(&self) -> Result<JobId, SubmissionError> {
        let request = self.client.post(self.trigger_url.clone());
        let response = authorize(request, self.credentials.as_ref())
            .await
            .send()
            .await?;

        let body: TriggerResponse = parse_response(response).await?;
        let job_id = body
            .job_id
            .as_deref()
            .and_then(JobId::new)
            .ok_or(SubmissionError::MissingJobId)?;

        tracing::info!(job_id = %job_id, "Triggered job");
        Ok(job_id)
    }
}

/// Client for the flow and file-metadata API.
pub struct FlowApi {
    client: reqwest::Client,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
}

impl FlowApi {
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

    /// Create a new flow for the signed-in user.
    ///
    /// Sends `GET {base_url}/flow/generate-flow` and returns the id of the
    /// first record in `data`. Fails with [`SubmissionError::NotSignedIn`]
    /// without sending anything when there is no access token.
    pub async fn generate_flow(&self) -> Result<FlowId, SubmissionError> {
        let token = self
            .credentials
            .access_token()
            .await
            .ok_or(SubmissionError::NotSignedIn)?;

        let response = self
            .client
            .get(self.url(GENERATE_FLOW_PATH)?)
            .bearer_auth(token.secret())
            .send()
            .await?;

        let body: GenerateFlowResponse = parse_response(response).await?;
        let flow_id = body
            .data
            .first()
            .and_then(|record| FlowId::from_json(&record.id))
            .ok_or(SubmissionError::MissingFlowId)?;

        tracing::info!(flow_id = %flow_id, "Generated flow");
        Ok(flow_id)
    }

    /// Record an uploaded file against its flow.
    ///
    /// Sends `POST {base_url}/files/upload-file-metadata` and returns the
    /// response body as-is.
    pub async fn register_file_metadata(
        &self,
        metadata: &FileMetadata,
    ) -> Result<serde_json::Value, SubmissionError> {
        let request = self
            .client
            .post(self.url(FILE_METADATA_PATH)?)
            .json(metadata);
        let response = authorize(request, self.credentials.as_ref())
            .await
            .send()
            .await?;

        let body = parse_response(response).await?;
        tracing::info!(
            flow_id = %metadata.flow_id,
            file_name = %metadata.file_name,
            "Registered file metadata",
        );
        Ok(body)
    }

    fn url(&self, path: &str) -> Result<Url, SubmissionError> {
        endpoint(&self.base_url, path).map_err(SubmissionError::InvalidUrl)
    }
}

// ---- private helpers ----

/// Ensure the response has a success status code, returning the status and
/// body text as [`SubmissionError::Api`] otherwise.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, SubmissionError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        tracing::warn!(status = status.as_u16(), body = %body, "API request failed");
        return Err(SubmissionError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Parse a successful JSON response body into the expected type.
async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, SubmissionError> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}
