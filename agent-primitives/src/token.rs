//! Bearer identity tokens.

use std::fmt;

use crate::endpoint::Audience;
use crate::error::{Error, Result};

/// Opaque, time-limited bearer credential scoped to an [`Audience`].
///
/// Tokens are minted per invocation and never persisted. The secret value is
/// kept out of `Debug` output so it cannot leak through logs.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityToken {
    value: String,
    audience: Audience,
}

impl IdentityToken {
    /// Wraps a freshly minted token for the supplied audience.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToken`] if the token is blank or contains
    /// characters that cannot appear in an HTTP header value.
    pub fn new(value: impl Into<String>, audience: Audience) -> Result<Self> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(Error::InvalidToken {
                reason: "token cannot be empty".into(),
            });
        }
        if value.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(Error::InvalidToken {
                reason: "token contains whitespace or control characters".into(),
            });
        }
        Ok(Self { value, audience })
    }

    /// Returns the audience the token was minted for.
    #[must_use]
    pub fn audience(&self) -> &Audience {
        &self.audience
    }

    /// Returns the raw token.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// Returns the `Authorization` header value (`Bearer <token>`).
    #[must_use]
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityToken")
            .field("audience", &self.audience.as_str())
            .field("value", &"<redacted>")
            .finish()
    }
}
