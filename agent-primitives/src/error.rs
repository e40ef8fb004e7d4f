//! Shared error definitions for agent primitives.

use thiserror::Error;

/// Result alias used throughout the agent runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing agent primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// A URL failed validation.
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl {
        /// The offending URL string.
        url: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// An identity token was empty or malformed.
    #[error("invalid identity token: {reason}")]
    InvalidToken {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A tool selector failed validation.
    #[error("invalid tool selector: {reason}")]
    InvalidSelector {
        /// Human-readable reason for rejection.
        reason: String,
    },
}

impl Error {
    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }
}
