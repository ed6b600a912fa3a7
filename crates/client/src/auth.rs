//! Password sign-in against the hosted auth service.
//!
//! The auth service is treated as an opaque token issuer.
//! [`AuthClient::sign_in_with_password`] exchanges an email and password
//! for an access token using the password grant and keeps the resulting
//! [`AuthSession`] in memory only. [`AuthClient`] is itself a
//! [`CredentialProvider`], so it can be handed to the APIs and the stream
//! source directly.

use async_trait::async_trait;
use chrono::{TimeDelta, TimeZone, Utc};
use jobstream_core::Timestamp;
use reqwest::Url;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::config::endpoint;
use crate::credentials::{AccessToken, CredentialProvider};

/// Token endpoint path, relative to the auth service base URL.
const TOKEN_PATH: &str = "auth/v1/token";

/// An authenticated session held in memory.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub access_token: AccessToken,
    pub refresh_token: Option<String>,
    /// When the access token stops being accepted, if the server said.
    pub expires_at: Option<Timestamp>,
    /// Auth-service id of the signed-in user.
    pub user_id: Option<String>,
}

impl AuthSession {
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn from_response(token: TokenResponse, now: Timestamp) -> Self {
        let expires_at = token
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| {
                // Out-of-range lifetimes are treated as "no expiry".
                token
                    .expires_in
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|lifetime| now.checked_add_signed(lifetime))
            });

        Self {
            access_token: AccessToken::new(token.access_token),
            refresh_token: token.refresh_token,
            expires_at,
            user_id: token.user.map(|u| u.id),
        }
    }
}

/// Successful password-grant response body.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    user: Option<UserRecord>,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: String,
}

/// Errors from the auth service.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The auth service refused the credentials or the request.
    #[error("Sign-in rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid auth URL: {0}")]
    InvalidUrl(String),
}

/// Client for the auth service's token endpoint.
pub struct AuthClient {
    client: reqwest::Client,
    token_url: Url,
    anon_key: String,
    session: RwLock<Option<AuthSession>>,
}

impl AuthClient {
    /// Create a client for the auth service at `base_url`.
    ///
    /// * `anon_key` - public project key sent as the `apikey` header.
    pub fn new(base_url: &Url, anon_key: impl Into<String>) -> Result<Self, AuthError> {
        Self::with_client(reqwest::Client::new(), base_url, anon_key)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: &Url,
        anon_key: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let mut token_url = endpoint(base_url, TOKEN_PATH).map_err(AuthError::InvalidUrl)?;
        token_url
            .query_pairs_mut()
            .append_pair("grant_type", "password");

        Ok(Self {
            client,
            token_url,
            anon_key: anon_key.into(),
            session: RwLock::new(None),
        })
    }

    /// Exchange an email and password for a session.
    ///
    /// On success the session replaces any previous one.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
        });

        let response = self
            .client
            .post(self.token_url.clone())
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Sign-in rejected");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message: rejection_message(&body),
            });
        }

        let token: TokenResponse = response.json().await?;
        let session = AuthSession::from_response(token, Utc::now());

        tracing::info!(user_id = ?session.user_id, "Signed in");
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    /// The current session, expired or not.
    pub async fn session(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    /// Forget the current session.
    pub async fn sign_out(&self) {
        if self.session.write().await.take().is_some() {
            tracing::info!("Signed out");
        }
    }
}

#[async_trait]
impl CredentialProvider for AuthClient {
    async fn access_token(&self) -> Option<AccessToken> {
        let guard = self.session.read().await;
        let session = guard.as_ref()?;
        if session.is_expired_at(Utc::now()) {
            tracing::debug!(user_id = ?session.user_id, "Auth session expired");
            return None;
        }
        Some(session.access_token.clone())
    }
}

/// Pull a human-readable message out of an auth error body.
fn rejection_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| v.get(key).and_then(|m| m.as_str()))
        })
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}
