//! Identity tokens minted from a service-account JSON key.
//!
//! The key signs a short-lived RS256 assertion carrying a
//! `target_audience` claim; the token endpoint exchanges it for an
//! identity token scoped to that audience.

use std::fmt;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use agent_adapters::http_client::{HyperClient, build_https_client};
use agent_primitives::{Audience, IdentityToken};
use async_trait::async_trait;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Request, Uri};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::provider::{IdentityTokenProvider, send};

/// `type` value of service-account key files.
pub const SERVICE_ACCOUNT_TYPE: &str = "service_account";

/// Token endpoint used when the key file does not name one.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;

/// Fields of a service-account key file this crate needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    private_key_id: Option<String>,
    private_key: String,
    client_email: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_owned()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("project_id", &self.project_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// Parses a key from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for malformed JSON and
    /// [`AuthError::UnsupportedCredentials`] for any `type` other than
    /// `service_account`.
    pub fn from_json(json: &str) -> AuthResult<Self> {
        let key: Self = serde_json::from_str(json)
            .map_err(|err| AuthError::invalid_credentials(format!("malformed key file: {err}")))?;
        if key.kind != SERVICE_ACCOUNT_TYPE {
            return Err(AuthError::UnsupportedCredentials { kind: key.kind });
        }
        Ok(key)
    }

    /// Reads and parses a key file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or does not hold a service-account key.
    pub fn from_file(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|err| {
            AuthError::invalid_credentials(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Service account e-mail.
    #[must_use]
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// Project owning the service account, when recorded in the key.
    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Token endpoint the assertion is exchanged at.
    #[must_use]
    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    sub: String,
    aud: String,
    iat: u64,
    exp: u64,
    target_audience: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
}

/// Exchanges signed assertions for identity tokens.
#[derive(Clone)]
pub struct ServiceAccountProvider {
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    client: HyperClient,
    timeout: Duration,
}

impl fmt::Debug for ServiceAccountProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountProvider")
            .field("key", &self.key)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountProvider {
    /// Creates a provider from a parsed key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] when the private key is
    /// not a usable RSA PEM.
    pub fn new(key: ServiceAccountKey, timeout: Duration) -> AuthResult<Self> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|err| AuthError::invalid_credentials(format!("unusable private key: {err}")))?;
        Ok(Self {
            key,
            signing_key,
            client: build_https_client(),
            timeout,
        })
    }

    /// Key this provider signs with.
    #[must_use]
    pub fn key(&self) -> &ServiceAccountKey {
        &self.key
    }

    fn assertion(&self, audience: &Audience) -> AuthResult<String> {
        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            sub: self.key.client_email.clone(),
            aud: self.key.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
            target_audience: audience.as_str().to_owned(),
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid.clone_from(&self.key.private_key_id);

        encode(&header, &claims, &self.signing_key)
            .map_err(|err| AuthError::invalid_credentials(format!("cannot sign assertion: {err}")))
    }
}

#[async_trait]
impl IdentityTokenProvider for ServiceAccountProvider {
    fn source(&self) -> &'static str {
        "service-account"
    }

    async fn fetch_identity_token(&self, audience: &Audience) -> AuthResult<IdentityToken> {
        let token_uri = &self.key.token_uri;
        let uri: Uri = token_uri.parse().map_err(|err| {
            AuthError::invalid_credentials(format!("invalid token_uri `{token_uri}`: {err}"))
        })?;
        let form = format!(
            "grant_type={}&assertion={}",
            urlencoding::encode(JWT_BEARER_GRANT),
            urlencoding::encode(&self.assertion(audience)?)
        );
        let request = Request::post(uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .map_err(|err| AuthError::invalid_credentials(format!("invalid request: {err}")))?;

        debug!(
            client_email = %self.key.client_email,
            %audience,
            "exchanging service account assertion for identity token"
        );
        let (status, body) = send(&self.client, request, self.timeout, "token endpoint").await?;
        if !status.is_success() {
            return Err(AuthError::rejected(status.as_u16(), body.trim().to_owned()));
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|err| {
            AuthError::rejected(status.as_u16(), format!("malformed token response: {err}"))
        })?;
        let id_token = parsed
            .id_token
            .ok_or_else(|| AuthError::rejected(status.as_u16(), "response carries no id_token"))?;
        IdentityToken::new(id_token, audience.clone())
            .map_err(|err| AuthError::rejected(status.as_u16(), format!("unusable token: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Response, Server, StatusCode};
    use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
    use serde_json::json;

    use super::*;

    const PRIVATE_KEY: &str = include_str!("../tests/fixtures/test_key.pem");
    const PUBLIC_KEY: &str = include_str!("../tests/fixtures/test_key.pub.pem");

    fn key_json(token_uri: &str) -> String {
        json!({
            "type": "service_account",
            "project_id": "demo-project",
            "private_key_id": "key-1",
            "private_key": PRIVATE_KEY,
            "client_email": "agent@demo-project.iam.gserviceaccount.com",
            "token_uri": token_uri,
        })
        .to_string()
    }

    fn audience() -> Audience {
        Audience::new("https://tools.example.run.app").unwrap()
    }

    async fn token_endpoint(
        status: StatusCode,
        body: &'static str,
    ) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
        let forms: Arc<Mutex<Vec<String>>> = Arc::default();
        let captured = Arc::clone(&forms);
        let make = make_service_fn(move |_| {
            let captured = Arc::clone(&captured);
            async move {
                Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                    let captured = Arc::clone(&captured);
                    async move {
                        let bytes = hyper::body::to_bytes(req.into_body()).await.unwrap();
                        captured
                            .lock()
                            .unwrap()
                            .push(String::from_utf8(bytes.to_vec()).unwrap());
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(status)
                                .body(Body::from(body))
                                .unwrap(),
                        )
                    }
                }))
            }
        });
        let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make);
        let addr = server.local_addr();
        tokio::spawn(server);
        (addr, forms)
    }

    fn form_field(form: &str, name: &str) -> String {
        form.split('&')
            .find_map(|pair| pair.strip_prefix(&format!("{name}=")))
            .map(|value| urlencoding::decode(value).unwrap().into_owned())
            .unwrap()
    }

    #[test]
    fn parses_key_and_defaults_token_uri() {
        let json = json!({
            "type": "service_account",
            "private_key": PRIVATE_KEY,
            "client_email": "agent@demo.iam.gserviceaccount.com",
        })
        .to_string();
        let key = ServiceAccountKey::from_json(&json).unwrap();
        assert_eq!(key.token_uri(), DEFAULT_TOKEN_URI);
        assert_eq!(key.project_id(), None);
        assert!(!format!("{key:?}").contains("PRIVATE KEY"));
    }

    #[test]
    fn rejects_other_credential_types() {
        let json = json!({
            "type": "authorized_user",
            "private_key": "",
            "client_email": "someone@example.com",
        })
        .to_string();
        let err = ServiceAccountKey::from_json(&json).expect_err("user credentials");
        assert!(matches!(err, AuthError::UnsupportedCredentials { ref kind } if kind == "authorized_user"));
    }

    #[test]
    fn rejects_garbage_private_key() {
        let json = json!({
            "type": "service_account",
            "private_key": "not a pem",
            "client_email": "agent@demo.iam.gserviceaccount.com",
        })
        .to_string();
        let key = ServiceAccountKey::from_json(&json).unwrap();
        let err = ServiceAccountProvider::new(key, Duration::from_secs(5)).expect_err("bad pem");
        assert!(matches!(err, AuthError::InvalidCredentials { .. }));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServiceAccountKey::from_file(dir.path().join("absent.json"))
            .expect_err("missing");
        assert!(matches!(err, AuthError::InvalidCredentials { .. }));
    }

    #[tokio::test]
    async fn exchanges_signed_assertion_for_identity_token() {
        let (addr, forms) =
            token_endpoint(StatusCode::OK, r#"{"id_token":"minted.id.token"}"#).await;
        let token_uri = format!("http://{addr}/token");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(&path, key_json(&token_uri)).unwrap();

        let key = ServiceAccountKey::from_file(&path).unwrap();
        let provider = ServiceAccountProvider::new(key, Duration::from_secs(5)).unwrap();
        let token = provider.fetch_identity_token(&audience()).await.unwrap();
        assert_eq!(token.expose(), "minted.id.token");

        let forms = forms.lock().unwrap();
        assert_eq!(forms.len(), 1);
        assert_eq!(form_field(&forms[0], "grant_type"), JWT_BEARER_GRANT);

        let assertion = form_field(&forms[0], "assertion");
        assert_eq!(decode_header(&assertion).unwrap().kid.as_deref(), Some("key-1"));

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[token_uri.as_str()]);
        let claims = decode::<AssertionClaims>(
            &assertion,
            &DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap()
        .claims;
        assert_eq!(claims.iss, "agent@demo-project.iam.gserviceaccount.com");
        assert_eq!(claims.sub, claims.iss);
        assert_eq!(claims.target_audience, "https://tools.example.run.app");
        assert_eq!(claims.exp - claims.iat, ASSERTION_LIFETIME_SECS);
    }

    #[tokio::test]
    async fn token_endpoint_rejection_is_reported() {
        let (addr, _) =
            token_endpoint(StatusCode::BAD_REQUEST, r#"{"error":"invalid_grant"}"#).await;
        let key = ServiceAccountKey::from_json(&key_json(&format!("http://{addr}/token"))).unwrap();
        let provider = ServiceAccountProvider::new(key, Duration::from_secs(5)).unwrap();

        let err = provider.fetch_identity_token(&audience()).await.expect_err("400");
        assert!(matches!(err, AuthError::Rejected { status: 400, ref reason } if reason.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn response_without_id_token_is_rejected() {
        let (addr, _) = token_endpoint(StatusCode::OK, r#"{"access_token":"nope"}"#).await;
        let key = ServiceAccountKey::from_json(&key_json(&format!("http://{addr}/token"))).unwrap();
        let provider = ServiceAccountProvider::new(key, Duration::from_secs(5)).unwrap();

        let err = provider.fetch_identity_token(&audience()).await.expect_err("no id_token");
        assert!(matches!(err, AuthError::Rejected { status: 200, .. }));
    }
}
