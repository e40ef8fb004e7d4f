//! Resolution of the process's ambient identity.

use std::path::PathBuf;
use std::time::Duration;

use agent_primitives::{Audience, IdentityToken};
use async_trait::async_trait;
use tracing::info;

use crate::error::AuthResult;
use crate::metadata::{DEFAULT_METADATA_HOST, METADATA_HOST_ENV, MetadataServerProvider};
use crate::provider::{IdentityTokenProvider, StaticTokenProvider};
use crate::service_account::{ServiceAccountKey, ServiceAccountProvider};

/// Environment variable carrying a pre-minted identity token.
pub const ID_TOKEN_ENV: &str = "MATH_AGENT_ID_TOKEN";

/// Environment variable naming a service-account key file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Default deadline for a single identity request.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Inputs to ambient identity resolution.
#[derive(Debug, Clone)]
pub struct AuthOptions {
    static_token: Option<String>,
    credentials_file: Option<PathBuf>,
    metadata_host: Option<String>,
    timeout: Duration,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            static_token: None,
            credentials_file: None,
            metadata_host: None,
            timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }
}

impl AuthOptions {
    /// Reads options from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads options through `lookup`, which maps variable names to values.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        Self {
            static_token: non_blank(ID_TOKEN_ENV),
            credentials_file: non_blank(CREDENTIALS_ENV).map(PathBuf::from),
            metadata_host: non_blank(METADATA_HOST_ENV),
            timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }

    /// Uses a fixed token and skips every other source.
    #[must_use]
    pub fn with_static_token(mut self, token: impl Into<String>) -> Self {
        self.static_token = Some(token.into());
        self
    }

    /// Signs with the service-account key at `path`.
    #[must_use]
    pub fn with_credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    /// Overrides the metadata server host.
    #[must_use]
    pub fn with_metadata_host(mut self, host: impl Into<String>) -> Self {
        self.metadata_host = Some(host.into());
        self
    }

    /// Sets the deadline for each identity request.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configured deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Whichever identity source the environment provides.
///
/// Sources are tried in order: a static token, then a service-account
/// key file, then the metadata server.
#[derive(Debug, Clone)]
pub enum AmbientTokenProvider {
    /// Pre-minted token.
    Static(StaticTokenProvider),
    /// Service-account key file.
    ServiceAccount(ServiceAccountProvider),
    /// Runtime metadata server.
    MetadataServer(MetadataServerProvider),
}

impl AmbientTokenProvider {
    /// Picks the identity source described by `options`.
    ///
    /// # Errors
    ///
    /// Fails when a credentials file is named but cannot be loaded. The
    /// metadata server is never contacted here.
    pub fn resolve(options: &AuthOptions) -> AuthResult<Self> {
        let provider = if let Some(token) = &options.static_token {
            Self::Static(StaticTokenProvider::new(token.clone()))
        } else if let Some(path) = &options.credentials_file {
            let key = ServiceAccountKey::from_file(path)?;
            Self::ServiceAccount(ServiceAccountProvider::new(key, options.timeout)?)
        } else {
            let host = options
                .metadata_host
                .clone()
                .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_owned());
            Self::MetadataServer(MetadataServerProvider::new(host, options.timeout))
        };
        info!(source = provider.source(), "resolved ambient identity");
        Ok(provider)
    }

    fn inner(&self) -> &dyn IdentityTokenProvider {
        match self {
            Self::Static(provider) => provider,
            Self::ServiceAccount(provider) => provider,
            Self::MetadataServer(provider) => provider,
        }
    }
}

#[async_trait]
impl IdentityTokenProvider for AmbientTokenProvider {
    fn source(&self) -> &'static str {
        self.inner().source()
    }

    async fn fetch_identity_token(&self, audience: &Audience) -> AuthResult<IdentityToken> {
        self.inner().fetch_identity_token(audience).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::AuthError;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn static_token_wins_over_other_sources() {
        let options = AuthOptions::from_lookup(lookup(&[
            (ID_TOKEN_ENV, "tok"),
            (CREDENTIALS_ENV, "/does/not/exist.json"),
        ]));
        let provider = AmbientTokenProvider::resolve(&options).unwrap();
        assert!(matches!(provider, AmbientTokenProvider::Static(_)));
    }

    #[test]
    fn falls_back_to_metadata_server() {
        let options = AuthOptions::from_lookup(lookup(&[(ID_TOKEN_ENV, "   ")]));
        let provider = AmbientTokenProvider::resolve(&options).unwrap();
        match provider {
            AmbientTokenProvider::MetadataServer(inner) => {
                assert_eq!(inner.host(), DEFAULT_METADATA_HOST);
            }
            other => panic!("unexpected provider {other:?}"),
        }
    }

    #[test]
    fn metadata_host_is_overridable() {
        let options = AuthOptions::from_lookup(lookup(&[(METADATA_HOST_ENV, "127.0.0.1:8099")]));
        match AmbientTokenProvider::resolve(&options).unwrap() {
            AmbientTokenProvider::MetadataServer(inner) => {
                assert_eq!(inner.host(), "127.0.0.1:8099");
            }
            other => panic!("unexpected provider {other:?}"),
        }
    }

    #[test]
    fn unreadable_credentials_file_fails_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let options = AuthOptions::default().with_credentials_file(dir.path().join("missing.json"));
        let err = AmbientTokenProvider::resolve(&options).expect_err("missing key file");
        assert!(matches!(err, AuthError::InvalidCredentials { .. }));
    }

    #[test]
    fn credentials_file_selects_service_account() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        let json = serde_json::json!({
            "type": "service_account",
            "private_key": include_str!("../tests/fixtures/test_key.pem"),
            "client_email": "agent@demo.iam.gserviceaccount.com",
        });
        std::fs::write(&path, json.to_string()).unwrap();

        let options = AuthOptions::default().with_credentials_file(&path);
        let provider = AmbientTokenProvider::resolve(&options).unwrap();
        assert_eq!(provider.source(), "service-account");
    }

    #[tokio::test]
    async fn delegates_fetch_to_selected_source() {
        let options = AuthOptions::default().with_static_token("abc");
        let provider = AmbientTokenProvider::resolve(&options).unwrap();
        let audience = Audience::new("https://tools.example.run.app").unwrap();
        let token = provider.fetch_identity_token(&audience).await.unwrap();
        assert_eq!(token.expose(), "abc");
    }
}
