//! Identity tokens from the compute metadata server.

use std::time::Duration;

use agent_adapters::http_client::{HyperClient, build_https_client};
use agent_primitives::{Audience, IdentityToken};
use async_trait::async_trait;
use hyper::{Body, Request, StatusCode, Uri};
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::provider::{IdentityTokenProvider, send};

/// Environment variable overriding the metadata server host.
pub const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";

/// Metadata server host on managed runtimes.
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

const METADATA_FLAVOR: &str = "Metadata-Flavor";

/// Asks the runtime's metadata server to sign a token for the default
/// service account of the host.
#[derive(Clone)]
pub struct MetadataServerProvider {
    client: HyperClient,
    host: String,
    timeout: Duration,
}

impl std::fmt::Debug for MetadataServerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataServerProvider")
            .field("host", &self.host)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl MetadataServerProvider {
    /// Creates a provider talking to `host` (`name` or `name:port`).
    #[must_use]
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: build_https_client(),
            host: host.into(),
            timeout,
        }
    }

    /// Returns the configured metadata host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    fn identity_uri(&self, audience: &Audience) -> AuthResult<Uri> {
        format!(
            "http://{}/computeMetadata/v1/instance/service-accounts/default/identity?audience={}&format=full",
            self.host,
            urlencoding::encode(audience.as_str())
        )
        .parse::<Uri>()
        .map_err(|err| AuthError::invalid_credentials(format!("invalid metadata host: {err}")))
    }
}

impl Default for MetadataServerProvider {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_HOST, Duration::from_secs(10))
    }
}

#[async_trait]
impl IdentityTokenProvider for MetadataServerProvider {
    fn source(&self) -> &'static str {
        "metadata-server"
    }

    async fn fetch_identity_token(&self, audience: &Audience) -> AuthResult<IdentityToken> {
        let request = Request::get(self.identity_uri(audience)?)
            .header(METADATA_FLAVOR, "Google")
            .body(Body::empty())
            .map_err(|err| AuthError::invalid_credentials(format!("invalid request: {err}")))?;

        debug!(host = %self.host, %audience, "requesting identity token from metadata server");
        let (status, body) = send(&self.client, request, self.timeout, "metadata server").await?;

        match status {
            StatusCode::OK => IdentityToken::new(body, audience.clone()).map_err(|err| {
                AuthError::rejected(status.as_u16(), format!("unusable token: {err}"))
            }),
            StatusCode::NOT_FOUND => Err(AuthError::unavailable(
                "metadata server has no default service account",
            )),
            other => Err(AuthError::rejected(other.as_u16(), body.trim().to_owned())),
        }
    }
}
