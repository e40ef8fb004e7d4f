//! Errors raised while minting identity tokens.

use thiserror::Error;

/// Result alias used by identity token providers.
pub type AuthResult<T> = Result<T, AuthError>;

/// Failure to obtain an identity token for an audience.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No ambient identity could be resolved from the environment.
    #[error("no ambient credentials available: {reason}")]
    Unavailable {
        /// Why resolution failed.
        reason: String,
    },

    /// The identity provider refused to mint a token for the audience.
    #[error("identity provider rejected the request ({status}): {reason}")]
    Rejected {
        /// HTTP status returned by the provider.
        status: u16,
        /// Provider-supplied explanation.
        reason: String,
    },

    /// A credentials file exists but cannot be used.
    #[error("invalid credentials: {reason}")]
    InvalidCredentials {
        /// What is wrong with the credentials.
        reason: String,
    },

    /// The credentials file describes an identity kind this crate cannot sign for.
    #[error("unsupported credential type `{kind}`")]
    UnsupportedCredentials {
        /// The `type` field found in the credentials file.
        kind: String,
    },

    /// The identity provider did not answer in time.
    #[error("identity provider timed out after {seconds}s")]
    Timeout {
        /// Configured deadline in seconds.
        seconds: u64,
    },
}

impl AuthError {
    /// Convenience constructor for unavailable ambient identity.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for unusable credentials.
    #[must_use]
    pub fn invalid_credentials(reason: impl Into<String>) -> Self {
        Self::InvalidCredentials {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for provider rejections.
    #[must_use]
    pub fn rejected(status: u16, reason: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            reason: reason.into(),
        }
    }
}
