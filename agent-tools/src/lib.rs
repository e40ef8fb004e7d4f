//! Local tool registration and remote tool invocation.
//!
//! [`registry`] holds the tools an agent exposes to its model;
//! [`remote`] drives the one-shot session used to reach tools hosted
//! elsewhere.

#![warn(missing_docs, clippy::pedantic)]

pub mod registry;
pub mod remote;

pub use registry::{Tool, ToolError, ToolHandle, ToolMetadata, ToolRegistry, ToolResult};
pub use remote::{RemoteToolError, RemoteToolInvoker, RemoteToolResult, SessionGuard};
