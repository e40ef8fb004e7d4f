//! A demonstration agent whose single tool, `get_sum`, adds two integers
//! by calling an authenticated remote MCP tool server.
//!
//! Each call mints a fresh identity token, opens one session, invokes the
//! remote tool and closes the session before returning.

#![warn(missing_docs, clippy::pedantic)]

mod agent;
mod definition;

pub use agent::{AgentError, AgentResult, CLIENT_NAME, ErrorKind, MathAgent, SetupError};
pub use definition::{
    AgentDefinition, GET_SUM_DESCRIPTION, GET_SUM_TOOL, describe, get_sum_metadata, register_tools,
};
