//! Transport adapters used by agents to reach remote tool servers.
//!
//! The [`traits`] module defines the session seam ([`traits::SessionConnector`],
//! [`traits::ToolSession`]); [`mcp`] implements it for the Model Context
//! Protocol over HTTP and server-sent events.

#![warn(missing_docs, clippy::pedantic)]

pub mod http_client;
pub mod jsonrpc;
pub mod mcp;
pub mod sse;
pub mod traits;
