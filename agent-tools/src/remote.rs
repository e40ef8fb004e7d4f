//! One-shot invocation of tools hosted on a remote server.
//!
//! Every call opens its own session, discovers the catalog, invokes the
//! selected tool and closes the session again. Nothing is cached between
//! calls.

use std::ops::{Deref, DerefMut};

use agent_adapters::traits::{AdapterError, RemoteToolDescriptor, SessionConnector, ToolSession};
use agent_primitives::{IdentityToken, ServiceEndpoint, ToolSelector};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

/// Result alias for remote tool operations.
pub type RemoteToolResult<T> = Result<T, RemoteToolError>;

/// Failures of a remote tool invocation.
#[derive(Debug, Error)]
pub enum RemoteToolError {
    /// The session could not be established or broke before the tool answered.
    #[error("connection to tool server failed: {reason}")]
    Connection {
        /// Transport-level explanation.
        reason: String,
    },

    /// The selector matched nothing in the discovered catalog.
    #[error("no tool matching {selector} among {available} discovered tool(s)")]
    ToolNotFound {
        /// Rendered selector.
        selector: String,
        /// Number of tools the server advertised.
        available: usize,
    },

    /// The tool ran and reported failure.
    #[error("tool `{tool}` failed: {reason}")]
    RemoteInvocation {
        /// Name of the invoked tool.
        tool: String,
        /// Error text from the server.
        reason: String,
    },
}

impl RemoteToolError {
    /// Maps a transport failure during session setup or discovery.
    fn connection(err: &AdapterError) -> Self {
        Self::Connection {
            reason: err.to_string(),
        }
    }

    /// Maps a failure of the tool call itself.
    fn invocation(tool: &str, err: AdapterError) -> Self {
        match err {
            AdapterError::Remote { reason } => Self::RemoteInvocation {
                tool: tool.to_owned(),
                reason,
            },
            other => Self::connection(&other),
        }
    }

    /// Result that was returned but could not be interpreted.
    #[must_use]
    pub fn unexpected_result(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RemoteInvocation {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}

/// Owns a live session and tears it down exactly once when dropped.
///
/// Dropping happens on every exit from an invocation: normal return,
/// early `?` return, panic unwinding, or cancellation of the future.
pub struct SessionGuard<S: ToolSession> {
    session: S,
}

impl<S: ToolSession> SessionGuard<S> {
    /// Takes ownership of `session`.
    pub fn new(session: S) -> Self {
        Self { session }
    }
}

impl<S: ToolSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: ToolSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: ToolSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.session.teardown();
    }
}

/// Connects, discovers, selects and calls a remote tool.
#[derive(Debug, Clone)]
pub struct RemoteToolInvoker<C> {
    connector: C,
}

impl<C: SessionConnector> RemoteToolInvoker<C> {
    /// Wraps a session connector.
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    /// Returns the underlying connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    async fn open(
        &self,
        endpoint: &ServiceEndpoint,
        token: &IdentityToken,
    ) -> RemoteToolResult<SessionGuard<C::Session>> {
        let session = self
            .connector
            .connect(endpoint, token)
            .await
            .map_err(|err| RemoteToolError::connection(&err))?;
        Ok(SessionGuard::new(session))
    }

    /// Returns the catalog the server advertises, in server order.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteToolError::Connection`] when the session cannot be
    /// established or discovery fails.
    pub async fn discover(
        &self,
        endpoint: &ServiceEndpoint,
        token: &IdentityToken,
    ) -> RemoteToolResult<Vec<RemoteToolDescriptor>> {
        let mut session = self.open(endpoint, token).await?;
        session
            .list_tools()
            .await
            .map_err(|err| RemoteToolError::connection(&err))
    }

    /// Invokes the tool picked by `selector` with `arguments`.
    ///
    /// # Errors
    ///
    /// - [`RemoteToolError::Connection`] for session, discovery or transport failures.
    /// - [`RemoteToolError::ToolNotFound`] when `selector` matches nothing.
    /// - [`RemoteToolError::RemoteInvocation`] when the tool reports an error.
    pub async fn invoke(
        &self,
        endpoint: &ServiceEndpoint,
        token: &IdentityToken,
        selector: &ToolSelector,
        arguments: Map<String, Value>,
    ) -> RemoteToolResult<Value> {
        let mut session = self.open(endpoint, token).await?;

        let tools = session
            .list_tools()
            .await
            .map_err(|err| RemoteToolError::connection(&err))?;
        debug!(count = tools.len(), "discovered remote tools");

        let position = selector
            .position(tools.iter().map(RemoteToolDescriptor::name))
            .ok_or_else(|| RemoteToolError::ToolNotFound {
                selector: selector.to_string(),
                available: tools.len(),
            })?;
        let name = tools[position].name();

        info!(tool = name, %selector, "invoking remote tool");
        session
            .call_tool(name, arguments)
            .await
            .map_err(|err| RemoteToolError::invocation(name, err))
    }
}
