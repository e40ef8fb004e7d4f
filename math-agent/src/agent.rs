//! The math agent and its error taxonomy.

use std::fmt;
use std::sync::Arc;

use agent_adapters::mcp::{SseConfig, SseConnector};
use agent_adapters::traits::{RemoteToolDescriptor, SessionConnector};
use agent_auth::{AmbientTokenProvider, AuthError, IdentityTokenProvider};
use agent_config::{AgentConfig, ConfigError};
use agent_primitives::{Audience, InvocationId, ServiceEndpoint, ToolSelector};
use agent_tools::{RemoteToolError, RemoteToolInvoker};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span};

/// Client name announced during the MCP handshake.
pub const CLIENT_NAME: &str = "math-agent";

/// Result alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Failure of an agent operation.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No identity token could be obtained; the tool server was not contacted.
    #[error("authentication failed: {0}")]
    Authentication(#[source] AuthError),

    /// The remote tool call failed.
    #[error(transparent)]
    Remote(#[from] RemoteToolError),
}

/// Coarse classification of [`AgentError`] for callers and exit reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Identity token could not be obtained.
    Authentication,
    /// Session could not be established or broke.
    Connection,
    /// Selected tool is not offered by the server.
    ToolNotFound,
    /// Tool ran and failed, or returned an unusable result.
    RemoteInvocation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Authentication => "AuthenticationError",
            Self::Connection => "ConnectionError",
            Self::ToolNotFound => "ToolNotFoundError",
            Self::RemoteInvocation => "RemoteInvocationError",
        })
    }
}

impl AgentError {
    /// Classifies the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::Remote(RemoteToolError::Connection { .. }) => ErrorKind::Connection,
            Self::Remote(RemoteToolError::ToolNotFound { .. }) => ErrorKind::ToolNotFound,
            Self::Remote(RemoteToolError::RemoteInvocation { .. }) => ErrorKind::RemoteInvocation,
        }
    }
}

/// Failure to assemble an agent from configuration.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Configuration is incomplete or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No identity source could be prepared.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Sums two integers by calling a tool on a remote server.
///
/// Every call mints its own token and opens its own session, so one
/// agent can be shared across tasks behind an [`Arc`].
pub struct MathAgent<C = SseConnector> {
    credentials: Arc<dyn IdentityTokenProvider>,
    invoker: RemoteToolInvoker<C>,
    endpoint: ServiceEndpoint,
    audience: Audience,
    selector: ToolSelector,
}

impl<C> fmt::Debug for MathAgent<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MathAgent")
            .field("credentials", &self.credentials.source())
            .field("endpoint", &self.endpoint)
            .field("audience", &self.audience)
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

impl MathAgent<SseConnector> {
    /// Builds an agent talking MCP over SSE, with credentials resolved
    /// from the ambient environment. Performs no network I/O.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] for invalid configuration or an unusable
    /// credentials file.
    pub fn from_config(config: &AgentConfig) -> Result<Self, SetupError> {
        config.validate()?;
        let credentials = AmbientTokenProvider::resolve(&config.auth_options())?;
        let connector = SseConnector::new(
            SseConfig::new(CLIENT_NAME, env!("CARGO_PKG_VERSION"))
                .with_timeout(config.remote_timeout()),
        );
        Ok(Self::new(
            Arc::new(credentials),
            connector,
            config.endpoint()?,
            config.audience()?,
            config.selector()?,
        ))
    }
}

impl<C: SessionConnector> MathAgent<C> {
    /// Assembles an agent from its parts.
    pub fn new(
        credentials: Arc<dyn IdentityTokenProvider>,
        connector: C,
        endpoint: ServiceEndpoint,
        audience: Audience,
        selector: ToolSelector,
    ) -> Self {
        Self {
            credentials,
            invoker: RemoteToolInvoker::new(connector),
            endpoint,
            audience,
            selector,
        }
    }

    /// Remote endpoint the agent calls.
    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// How the remote tool is chosen.
    pub fn selector(&self) -> &ToolSelector {
        &self.selector
    }

    /// Returns `a + b` as computed by the remote tool.
    ///
    /// # Errors
    ///
    /// - [`AgentError::Authentication`] when no token can be minted; the
    ///   server is not contacted in that case.
    /// - [`AgentError::Remote`] for connection, selection or tool failures,
    ///   including a result that is not an integer.
    pub async fn get_sum(&self, a: i64, b: i64) -> AgentResult<i64> {
        let invocation_id = InvocationId::random();
        let span = info_span!("get_sum", %invocation_id, a, b);

        async move {
            let token = self
                .credentials
                .fetch_identity_token(&self.audience)
                .await
                .map_err(AgentError::Authentication)?;
            debug!(source = self.credentials.source(), "identity token minted");

            let mut arguments = Map::new();
            arguments.insert("a".into(), a.into());
            arguments.insert("b".into(), b.into());

            let value = self
                .invoker
                .invoke(&self.endpoint, &token, &self.selector, arguments)
                .await?;
            let sum = as_integer(&value).ok_or_else(|| {
                RemoteToolError::unexpected_result(
                    self.selector.to_string(),
                    format!("expected an integer result, got {value}"),
                )
            })?;
            info!(sum, "remote sum computed");
            Ok::<_, AgentError>(sum)
        }
        .instrument(span)
        .await
    }

    /// Lists the tools the remote server advertises.
    ///
    /// # Errors
    ///
    /// Same authentication and connection failures as [`Self::get_sum`].
    pub async fn remote_tools(&self) -> AgentResult<Vec<RemoteToolDescriptor>> {
        let token = self
            .credentials
            .fetch_identity_token(&self.audience)
            .await
            .map_err(AgentError::Authentication)?;
        Ok(self.invoker.discover(&self.endpoint, &token).await?)
    }
}

/// Accepts integers and floats without a fractional part.
fn as_integer(value: &Value) -> Option<i64> {
    if let Some(integer) = value.as_i64() {
        return Some(integer);
    }
    if value.is_u64() {
        return None;
    }
    let float = value.as_f64()?;
    // `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
    #[allow(clippy::cast_precision_loss)]
    let fits = float.fract() == 0.0 && float >= i64::MIN as f64 && float < i64::MAX as f64;
    #[allow(clippy::cast_possible_truncation)]
    fits.then_some(float as i64)
}
