//! Audiences and remote service endpoints.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Default sub-path of the streaming-event transport.
pub const DEFAULT_SSE_PATH: &str = "/sse";

/// Intended recipient that an identity token is scoped to.
///
/// Audiences are absolute `http`/`https` URLs. The textual form is kept as
/// supplied (minus a trailing slash) because identity providers compare the
/// audience claim byte-for-byte against the registered service URL.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Audience(String);

impl Audience {
    /// Validates and wraps the supplied audience URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the value is not an absolute
    /// `http`/`https` URL with a host.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let trimmed = value.trim().trim_end_matches('/');
        validate_http_url(trimmed)?;
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the audience as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Audience {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Audience {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Audience {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Audience> for String {
    fn from(value: Audience) -> Self {
        value.0
    }
}

/// Base URL of a remote tool server plus the path of its event stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceEndpoint {
    base_url: Url,
    sse_path: String,
}

impl ServiceEndpoint {
    /// Creates an endpoint using the default `/sse` stream path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the base URL is not an absolute
    /// `http`/`https` URL.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let base_url = validate_http_url(base_url.as_ref().trim().trim_end_matches('/'))?;
        Ok(Self {
            base_url,
            sse_path: DEFAULT_SSE_PATH.to_owned(),
        })
    }

    /// Overrides the event stream sub-path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the path is empty or not a relative path.
    pub fn with_sse_path(mut self, path: impl AsRef<str>) -> Result<Self> {
        let path = path.as_ref().trim();
        let stripped = path.trim_start_matches('/');
        if stripped.is_empty() {
            return Err(Error::invalid_url(path, "stream path cannot be empty"));
        }
        if stripped.contains("://") {
            return Err(Error::invalid_url(path, "stream path must be relative"));
        }
        self.sse_path = format!("/{stripped}");
        Ok(self)
    }

    /// Returns the base URL of the remote service.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the event stream sub-path (always starting with `/`).
    #[must_use]
    pub fn sse_path(&self) -> &str {
        &self.sse_path
    }

    /// Returns `base_url + sse_path`, preserving any path prefix of the base.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the joined URL cannot be parsed.
    pub fn sse_url(&self) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = format!("{base}{}", self.sse_path);
        Url::parse(&joined).map_err(|err| Error::invalid_url(joined, err.to_string()))
    }

    /// Returns the audience derived from the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the base URL cannot serve as an audience.
    pub fn audience(&self) -> Result<Audience> {
        Audience::new(self.base_url.as_str())
    }
}

impl Display for ServiceEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            self.sse_path
        )
    }
}

fn validate_http_url(value: &str) -> Result<Url> {
    if value.is_empty() {
        return Err(Error::invalid_url(value, "url cannot be empty"));
    }
    let url = Url::parse(value).map_err(|err| Error::invalid_url(value, err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::invalid_url(value, "url must use http or https"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::invalid_url(value, "url must include a host"));
    }
    if url.fragment().is_some() {
        return Err(Error::invalid_url(value, "url must not carry a fragment"));
    }
    Ok(url)
}
