//! Credential accessors injected into every outbound request.
//!
//! Nothing in this crate reads ambient session state. The stream source
//! and the APIs are handed an `Arc<dyn CredentialProvider>` and ask it for
//! a bearer token per request, so tests can run with fixed or absent
//! credentials.

use std::fmt;

use async_trait::async_trait;

/// A bearer access token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Source of the current user's access token.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// The token to attach to the next request, or `None` when no user is
    /// signed in.
    async fn access_token(&self) -> Option<AccessToken>;
}

/// No user; requests go out without an `Authorization` header.
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

#[async_trait]
impl CredentialProvider for Anonymous {
    async fn access_token(&self) -> Option<AccessToken> {
        None
    }
}

/// A fixed token, e.g. one passed on the command line.
#[derive(Debug, Clone)]
pub struct StaticToken(AccessToken);

impl StaticToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(AccessToken::new(secret))
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn access_token(&self) -> Option<AccessToken> {
        Some(self.0.clone())
    }
}

/// Attach the provider's token to a request, if it has one.
pub(crate) async fn authorize(
    request: reqwest::RequestBuilder,
    credentials: &dyn CredentialProvider,
) -> reqwest::RequestBuilder {
    match credentials.access_token().await {
        Some(token) => request.bearer_auth(token.secret()),
        None => request,
    }
}
