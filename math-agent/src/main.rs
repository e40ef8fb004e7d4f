use std::path::PathBuf;

use agent_config::{AgentConfig, LogFormat};
use agent_telemetry::init_tracing;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use math_agent::{AgentError, MathAgent, describe, get_sum_metadata};

/// Adds numbers with a remote, authenticated MCP tool.
#[derive(Debug, Parser)]
#[command(name = "math-agent", version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the remote tool server.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Remote tool to call, by name.
    #[arg(long, global = true)]
    tool_name: Option<String>,

    /// Remote tool to call, by position in the catalog.
    #[arg(long, global = true)]
    tool_index: Option<usize>,

    /// Log output format (`plain` or `json`).
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print `A + B` as computed by the remote tool.
    Sum {
        #[arg(allow_negative_numbers = true)]
        a: i64,
        #[arg(allow_negative_numbers = true)]
        b: i64,
    },
    /// List the tools the remote server offers.
    Tools,
    /// Print the agent definition as JSON without contacting anything.
    Describe,
}

impl Cli {
    fn apply(&self, config: &mut AgentConfig) {
        if let Some(url) = &self.base_url {
            config.remote.base_url = Some(url.clone());
        }
        if let Some(name) = &self.tool_name {
            config.remote.tool_name.clone_from(name);
            config.remote.tool_index = None;
        }
        if let Some(index) = self.tool_index {
            config.remote.tool_index = Some(index);
        }
        if let Some(format) = self.log_format {
            config.telemetry.format = format;
        }
    }
}

/// Puts the error kind at the head of the reported chain.
fn classified(err: AgentError) -> anyhow::Error {
    let kind = err.kind();
    anyhow::Error::new(err).context(kind.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        AgentConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply(&mut config);
    init_tracing(&config.telemetry).context("failed to initialise logging")?;

    match cli.command {
        Command::Describe => {
            let description = describe(&config.agent, &config.project, &[get_sum_metadata()]);
            println!("{}", serde_json::to_string_pretty(&description)?);
        }
        Command::Sum { a, b } => {
            let agent = MathAgent::from_config(&config).context("invalid agent setup")?;
            let sum = agent.get_sum(a, b).await.map_err(classified)?;
            println!("{sum}");
        }
        Command::Tools => {
            let agent = MathAgent::from_config(&config).context("invalid agent setup")?;
            let tools = agent.remote_tools().await.map_err(classified)?;
            for tool in tools {
                match tool.description() {
                    Some(description) => println!("{}\t{description}", tool.name()),
                    None => println!("{}", tool.name()),
                }
            }
        }
    }

    Ok(())
}
