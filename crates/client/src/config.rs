use std::time::Duration;

use reqwest::Url;

/// Default queue API base URL (trigger and status stream endpoints).
const DEFAULT_API_URL: &str = "http://localhost:8000/";
/// Default flow API base URL (flow generation and file metadata).
const DEFAULT_FLOW_API_URL: &str = "http://localhost:8000/api/v1/";
/// Default job trigger endpoint, relative to the queue API.
const DEFAULT_TRIGGER_PATH: &str = "queue/trigger-demo-task";
/// Default bucket for resumable uploads.
const DEFAULT_UPLOAD_BUCKET: &str = "test-bucket";
/// Default timeout for one-shot HTTP requests, in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client configuration loaded from environment variables.
///
/// All fields except the auth service have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the queue API.
    pub api_url: Url,
    /// Base URL of the flow/file API.
    pub flow_api_url: Url,
    /// Trigger endpoint, relative to `api_url`.
    pub trigger_path: String,
    /// Timeout for one-shot requests. Never applied to the status stream.
    pub request_timeout: Duration,
    /// Auth service base URL. Sign-in is unavailable when unset.
    pub auth_url: Option<Url>,
    /// Public key sent to the auth service as `apikey`.
    pub auth_anon_key: String,
    /// Bucket that uploaded files land in.
    pub upload_bucket: String,
}

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is not a valid URL: {reason}")]
    InvalidUrl { name: &'static str, reason: String },

    #[error("{name} must be a whole number of seconds, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default                          |
    /// |----------------------------------|----------------------------------|
    /// | `JOBSTREAM_API_URL`              | `http://localhost:8000/`         |
    /// | `JOBSTREAM_FLOW_API_URL`         | `http://localhost:8000/api/v1/`  |
    /// | `JOBSTREAM_TRIGGER_PATH`         | `queue/trigger-demo-task`        |
    /// | `JOBSTREAM_REQUEST_TIMEOUT_SECS` | `30`                             |
    /// | `SUPABASE_URL`                   | unset                            |
    /// | `SUPABASE_ANON_KEY`              | empty                            |
    /// | `JOBSTREAM_UPLOAD_BUCKET`        | `test-bucket`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_url = parse_url(
            "JOBSTREAM_API_URL",
            &var("JOBSTREAM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into()),
        )?;

        let flow_api_url = parse_url(
            "JOBSTREAM_FLOW_API_URL",
            &var("JOBSTREAM_FLOW_API_URL").unwrap_or_else(|| DEFAULT_FLOW_API_URL.into()),
        )?;

        let trigger_path =
            var("JOBSTREAM_TRIGGER_PATH").unwrap_or_else(|| DEFAULT_TRIGGER_PATH.into());

        let request_timeout = match var("JOBSTREAM_REQUEST_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(value.trim().parse().map_err(|_| {
                ConfigError::InvalidNumber {
                    name: "JOBSTREAM_REQUEST_TIMEOUT_SECS",
                    value: value.clone(),
                }
            })?),
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };

        let auth_url = var("SUPABASE_URL")
            .map(|url| parse_url("SUPABASE_URL", &url))
            .transpose()?;

        let auth_anon_key = var("SUPABASE_ANON_KEY").unwrap_or_default();

        let upload_bucket =
            var("JOBSTREAM_UPLOAD_BUCKET").unwrap_or_else(|| DEFAULT_UPLOAD_BUCKET.into());

        Ok(Self {
            api_url,
            flow_api_url,
            trigger_path,
            request_timeout,
            auth_url,
            auth_anon_key,
            upload_bucket,
        })
    }

    /// HTTP client for one-shot requests (trigger, flow, file metadata).
    pub fn request_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
    }

    /// HTTP client for long-lived status streams: connect timeout only.
    pub fn stream_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .connect_timeout(self.request_timeout)
            .build()
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
        name,
        reason: e.to_string(),
    })
}

/// Resolve `path` against `base`, treating `base` as a directory even when
/// it lacks a trailing slash.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, String> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|e| e.to_string())
}
