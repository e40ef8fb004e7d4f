//! What the hosting framework sees: the agent profile and its tools.

use std::sync::Arc;

use agent_adapters::traits::SessionConnector;
use agent_config::{AgentProfile, ProjectConfig};
use agent_tools::{Tool, ToolError, ToolMetadata, ToolRegistry, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::agent::MathAgent;

/// Name of the local sum tool.
pub const GET_SUM_TOOL: &str = "get_sum";

/// Description shown to the model.
pub const GET_SUM_DESCRIPTION: &str = "Get sum for two numbers";

/// Metadata of the `get_sum` tool.
#[must_use]
pub fn get_sum_metadata() -> ToolMetadata {
    ToolMetadata::new(GET_SUM_TOOL)
        .unwrap_or_else(|_| unreachable!("tool name is a non-empty constant"))
        .with_description(GET_SUM_DESCRIPTION)
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "a": { "type": "integer", "description": "First addend" },
                "b": { "type": "integer", "description": "Second addend" },
            },
            "required": ["a", "b"],
        }))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SumInput {
    a: i64,
    b: i64,
}

/// Executor backing `get_sum`.
struct GetSumTool<C> {
    agent: Arc<MathAgent<C>>,
}

#[async_trait]
impl<C> Tool for GetSumTool<C>
where
    C: SessionConnector + 'static,
{
    async fn invoke(&self, input: Value) -> ToolResult<Value> {
        let SumInput { a, b } =
            serde_json::from_value(input).map_err(|err| ToolError::invalid_input(err.to_string()))?;
        let sum = self
            .agent
            .get_sum(a, b)
            .await
            .map_err(|err| ToolError::execution(format!("{}: {err}", err.kind())))?;
        Ok(json!({ "result": sum }))
    }
}

/// Registers `get_sum` backed by `agent`.
///
/// # Errors
///
/// Returns [`ToolError::DuplicateTool`] when the registry already has it.
pub fn register_tools<C>(registry: &ToolRegistry, agent: Arc<MathAgent<C>>) -> ToolResult<()>
where
    C: SessionConnector + 'static,
{
    registry.register_tool(get_sum_metadata(), GetSumTool { agent })
}

/// The agent as described to the hosting framework.
#[derive(Debug)]
pub struct AgentDefinition {
    profile: AgentProfile,
    project: ProjectConfig,
    tools: ToolRegistry,
}

impl AgentDefinition {
    /// Builds the root agent: `profile` hosted in `project`, plus the
    /// `get_sum` tool.
    ///
    /// # Errors
    ///
    /// Propagates registration failures.
    pub fn root_agent<C>(
        profile: AgentProfile,
        project: ProjectConfig,
        agent: Arc<MathAgent<C>>,
    ) -> ToolResult<Self>
    where
        C: SessionConnector + 'static,
    {
        let tools = ToolRegistry::new();
        register_tools(&tools, agent)?;
        Ok(Self {
            profile,
            project,
            tools,
        })
    }

    /// Agent name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.profile.name
    }

    /// Model identifier.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.profile.model
    }

    /// System instruction.
    #[must_use]
    pub fn instruction(&self) -> &str {
        &self.profile.instruction
    }

    /// Project, region and model backend the agent is hosted with.
    #[must_use]
    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }

    /// Registered tools.
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// JSON description of the agent and its tool schemas.
    #[must_use]
    pub fn describe(&self) -> Value {
        describe(&self.profile, &self.project, &self.tools.list())
    }
}

/// JSON description of an agent profile, its hosting project and the given
/// tools.
#[must_use]
pub fn describe(profile: &AgentProfile, project: &ProjectConfig, tools: &[ToolMetadata]) -> Value {
    json!({
        "name": profile.name,
        "model": profile.model,
        "instruction": profile.instruction,
        "project": project,
        "tools": tools,
    })
}
