//! Identity token providers for authenticating to remote tool services.
//!
//! Tokens are audience-scoped and minted fresh on every request; nothing
//! here caches them.

#![warn(missing_docs, clippy::pedantic)]

mod ambient;
mod error;
mod metadata;
mod provider;
mod service_account;

pub use ambient::{
    AmbientTokenProvider, AuthOptions, CREDENTIALS_ENV, DEFAULT_AUTH_TIMEOUT, ID_TOKEN_ENV,
};
pub use error::{AuthError, AuthResult};
pub use metadata::{DEFAULT_METADATA_HOST, METADATA_HOST_ENV, MetadataServerProvider};
pub use provider::{IdentityTokenProvider, StaticTokenProvider};
pub use service_account::{
    DEFAULT_TOKEN_URI, SERVICE_ACCOUNT_TYPE, ServiceAccountKey, ServiceAccountProvider,
};
