//! The provider seam and the fixed-token implementation.

use std::fmt;
use std::time::Duration;

use agent_adapters::http_client::{HyperClient, read_body};
use agent_primitives::{Audience, IdentityToken};
use async_trait::async_trait;
use hyper::{Body, Request, StatusCode};
use tokio::time::timeout;

use crate::error::{AuthError, AuthResult};

/// Mints bearer identity tokens scoped to an audience.
///
/// Implementations resolve the caller's identity from their own
/// configuration; callers only supply the audience.
#[async_trait]
pub trait IdentityTokenProvider: Send + Sync {
    /// Short name of the identity source, for logs.
    fn source(&self) -> &'static str;

    /// Mints a fresh token valid for at least one immediate use.
    async fn fetch_identity_token(&self, audience: &Audience) -> AuthResult<IdentityToken>;
}

/// Returns a pre-minted token, e.g. one printed by a CLI for local runs.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenProvider").finish_non_exhaustive()
    }
}

impl StaticTokenProvider {
    /// Wraps the supplied token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl IdentityTokenProvider for StaticTokenProvider {
    fn source(&self) -> &'static str {
        "static"
    }

    async fn fetch_identity_token(&self, audience: &Audience) -> AuthResult<IdentityToken> {
        IdentityToken::new(self.token.clone(), audience.clone())
            .map_err(|err| AuthError::invalid_credentials(err.to_string()))
    }
}

/// Sends a request to an identity endpoint and buffers the answer.
pub(crate) async fn send(
    client: &HyperClient,
    request: Request<Body>,
    deadline: Duration,
    target: &str,
) -> AuthResult<(StatusCode, String)> {
    let response = timeout(deadline, client.request(request))
        .await
        .map_err(|_| AuthError::Timeout {
            seconds: deadline.as_secs(),
        })?
        .map_err(|err| AuthError::unavailable(format!("{target} unreachable: {err}")))?;

    let status = response.status();
    let body = read_body(response.into_body())
        .await
        .map_err(|err| AuthError::unavailable(format!("{target} response unreadable: {err}")))?;
    Ok((status, String::from_utf8_lossy(&body).into_owned()))
}
