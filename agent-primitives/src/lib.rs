//! Core shared types for agents that call remote tools.

#![warn(missing_docs, clippy::pedantic)]

mod endpoint;
mod error;
mod ids;
mod selector;
mod token;

/// Token audiences and remote service endpoints.
pub use endpoint::{Audience, DEFAULT_SSE_PATH, ServiceEndpoint};
/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Per-invocation correlation identifier.
pub use ids::InvocationId;
/// Remote tool selection strategy.
pub use selector::ToolSelector;
/// Bearer identity tokens.
pub use token::IdentityToken;
