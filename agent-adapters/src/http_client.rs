//! HTTPS client construction shared by the transport and credential code.

use std::sync::Arc;

use hyper::body::HttpBody;
use hyper::client::HttpConnector;
use hyper::{Body, Client};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use webpki_roots::TLS_SERVER_ROOTS;

use crate::traits::{AdapterError, AdapterResult};

/// Hyper client speaking both `http` and `https` (rustls, webpki roots).
pub type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Upper bound for buffered (non-streaming) response bodies.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Builds a client that never keeps idle connections around, so every
/// session owns its connections outright and closes them on teardown.
#[must_use]
pub fn build_https_client() -> HyperClient {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));

    Client::builder()
        .pool_max_idle_per_host(0)
        .build::<_, Body>(connector)
}

/// Reads a complete response body, refusing anything above [`MAX_BODY_BYTES`].
///
/// # Errors
///
/// Returns [`AdapterError::Connection`] when the body cannot be read and
/// [`AdapterError::Protocol`] when it exceeds the size limit.
pub async fn read_body(mut body: Body) -> AdapterResult<Vec<u8>> {
    let mut buffer = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk
            .map_err(|err| AdapterError::connection(format!("failed to read body: {err}")))?;
        if buffer.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(AdapterError::protocol(format!(
                "response body exceeds {MAX_BODY_BYTES} bytes"
            )));
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer)
}
