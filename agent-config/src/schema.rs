//! Strongly typed configuration schema.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agent_auth::{AuthOptions, ServiceAccountKey};
use agent_primitives::{Audience, DEFAULT_SSE_PATH, ServiceEndpoint, ToolSelector};
use agent_telemetry::{LogFormat, TelemetryConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Name the agent is published under.
pub const DEFAULT_AGENT_NAME: &str = "root_agent";
/// Model the agent definition asks for.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
/// System instruction of the agent definition.
pub const DEFAULT_INSTRUCTION: &str =
    "You are a helpful AI assistant designed to provide accurate and useful information.";
/// Cloud region used when none is configured.
pub const DEFAULT_LOCATION: &str = "us-central1";
/// Remote tool invoked when no selector is configured.
pub const DEFAULT_TOOL_NAME: &str = "add";

const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 10;

/// Environment variables read by [`AgentConfig::apply_env`].
pub mod env {
    /// Base URL of the remote tool server.
    pub const MCP_URL: &str = "MATH_AGENT_MCP_URL";
    /// Event-stream path below the base URL.
    pub const SSE_PATH: &str = "MATH_AGENT_SSE_PATH";
    /// Token audience, when it differs from the base URL.
    pub const AUDIENCE: &str = "MATH_AGENT_AUDIENCE";
    /// Remote tool name.
    pub const TOOL_NAME: &str = "MATH_AGENT_TOOL_NAME";
    /// Remote tool position in the discovered catalog.
    pub const TOOL_INDEX: &str = "MATH_AGENT_TOOL_INDEX";
    /// Per-step deadline for remote calls, in seconds.
    pub const TIMEOUT_SECS: &str = "MATH_AGENT_TIMEOUT_SECS";
    /// `plain` or `json` log output.
    pub const LOG_FORMAT: &str = "MATH_AGENT_LOG_FORMAT";
    /// Cloud project id.
    pub const PROJECT: &str = "GOOGLE_CLOUD_PROJECT";
    /// Cloud region.
    pub const LOCATION: &str = "GOOGLE_CLOUD_LOCATION";
    /// Whether the model is served through Vertex AI.
    pub const USE_VERTEXAI: &str = "GOOGLE_GENAI_USE_VERTEXAI";
    pub use agent_auth::{
        CREDENTIALS_ENV as CREDENTIALS, ID_TOKEN_ENV as ID_TOKEN,
        METADATA_HOST_ENV as METADATA_HOST,
    };
}

/// Cloud project the agent runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project id; falls back to the service account's project.
    pub project_id: Option<String>,
    /// Region.
    pub location: String,
    /// Serve the model through Vertex AI rather than the public API.
    pub use_vertexai: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            location: DEFAULT_LOCATION.to_owned(),
            use_vertexai: true,
        }
    }
}

/// How the agent presents itself to the hosting framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    /// Agent name.
    pub name: String,
    /// Model identifier.
    pub model: String,
    /// System instruction.
    pub instruction: String,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            name: DEFAULT_AGENT_NAME.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            instruction: DEFAULT_INSTRUCTION.to_owned(),
        }
    }
}

/// Where the remote tool lives and which one to call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the tool server.
    pub base_url: Option<String>,
    /// Event-stream path below `base_url`.
    pub sse_path: String,
    /// Token audience; defaults to `base_url`.
    pub audience: Option<String>,
    /// Tool name to select.
    pub tool_name: String,
    /// Tool position to select; takes precedence over `tool_name`.
    pub tool_index: Option<usize>,
    /// Per-step deadline in seconds.
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            sse_path: DEFAULT_SSE_PATH.to_owned(),
            audience: None,
            tool_name: DEFAULT_TOOL_NAME.to_owned(),
            tool_index: None,
            timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
        }
    }
}

/// Identity sources.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Service-account key file.
    pub credentials_file: Option<PathBuf>,
    /// Metadata server host override.
    pub metadata_host: Option<String>,
    /// Pre-minted identity token.
    pub static_token: Option<String>,
    /// Per-request deadline in seconds.
    pub timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials_file: None,
            metadata_host: None,
            static_token: None,
            timeout_secs: DEFAULT_AUTH_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("credentials_file", &self.credentials_file)
            .field("metadata_host", &self.metadata_host)
            .field("static_token", &self.static_token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Complete agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Cloud project settings.
    pub project: ProjectConfig,
    /// Agent identity.
    pub agent: AgentProfile,
    /// Remote tool server.
    pub remote: RemoteConfig,
    /// Identity token sources.
    pub auth: AuthConfig,
    /// Logging.
    pub telemetry: TelemetryConfig,
}

impl AgentConfig {
    /// Loads defaults, overlays `path` when given, then the process environment.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed, or an environment
    /// variable holds an unusable value.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parses a TOML file; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Parse`].
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        debug!(path = %path.display(), "loaded configuration file");
        Ok(config)
    }

    /// Overlays values found through `lookup`, which maps variable names
    /// (see [`env`]) to values. Blank values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for numbers, booleans or
    /// formats that do not parse.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = get(env::PROJECT) {
            self.project.project_id = Some(value);
        }
        if let Some(value) = get(env::LOCATION) {
            self.project.location = value;
        }
        if let Some(value) = get(env::USE_VERTEXAI) {
            self.project.use_vertexai = parse_bool(env::USE_VERTEXAI, &value)?;
        }

        if let Some(value) = get(env::MCP_URL) {
            self.remote.base_url = Some(value);
        }
        if let Some(value) = get(env::SSE_PATH) {
            self.remote.sse_path = value;
        }
        if let Some(value) = get(env::AUDIENCE) {
            self.remote.audience = Some(value);
        }
        // A name from the environment replaces a file-level index.
        if let Some(value) = get(env::TOOL_NAME) {
            self.remote.tool_name = value;
            self.remote.tool_index = None;
        }
        if let Some(value) = get(env::TOOL_INDEX) {
            self.remote.tool_index = Some(
                value
                    .parse()
                    .map_err(|err| ConfigError::invalid(env::TOOL_INDEX, err))?,
            );
        }
        if let Some(value) = get(env::TIMEOUT_SECS) {
            self.remote.timeout_secs = value
                .parse()
                .map_err(|err| ConfigError::invalid(env::TIMEOUT_SECS, err))?;
        }

        if let Some(value) = get(env::ID_TOKEN) {
            self.auth.static_token = Some(value);
        }
        if let Some(value) = get(env::CREDENTIALS) {
            self.auth.credentials_file = Some(PathBuf::from(value));
        }
        if let Some(value) = get(env::METADATA_HOST) {
            self.auth.metadata_host = Some(value);
        }

        if let Some(value) = get(env::LOG_FORMAT) {
            self.telemetry.format = value
                .parse::<LogFormat>()
                .map_err(|err| ConfigError::invalid(env::LOG_FORMAT, err))?;
        }

        self.fill_project_from_credentials();
        Ok(())
    }

    fn fill_project_from_credentials(&mut self) {
        if self.project.project_id.is_some() {
            return;
        }
        let Some(path) = &self.auth.credentials_file else {
            return;
        };
        match ServiceAccountKey::from_file(path) {
            Ok(key) => self.project.project_id = key.project_id().map(str::to_owned),
            Err(err) => debug!(error = %err, "no project id from credentials file"),
        }
    }

    /// Checks every setting the agent needs before doing any I/O.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid setting.
    pub fn validate(&self) -> ConfigResult<()> {
        self.audience()?;
        self.selector()?;
        if self.remote.timeout_secs == 0 {
            return Err(ConfigError::invalid("remote.timeout_secs", "must be positive"));
        }
        if self.auth.timeout_secs == 0 {
            return Err(ConfigError::invalid("auth.timeout_secs", "must be positive"));
        }
        if matches!(&self.auth.metadata_host, Some(host) if host.trim().is_empty()) {
            return Err(ConfigError::invalid("auth.metadata_host", "must not be blank"));
        }
        Ok(())
    }

    /// The remote tool server endpoint.
    ///
    /// # Errors
    ///
    /// Fails when `remote.base_url` is unset or either URL part is invalid.
    pub fn endpoint(&self) -> ConfigResult<ServiceEndpoint> {
        let base_url = self
            .remote
            .base_url
            .as_deref()
            .ok_or(ConfigError::Missing {
                field: "remote.base_url",
            })?;
        ServiceEndpoint::new(base_url)
            .map_err(|err| ConfigError::invalid("remote.base_url", err))?
            .with_sse_path(&self.remote.sse_path)
            .map_err(|err| ConfigError::invalid("remote.sse_path", err))
    }

    /// The audience tokens are minted for.
    ///
    /// # Errors
    ///
    /// Fails when the override or the derived base URL is not a valid audience.
    pub fn audience(&self) -> ConfigResult<Audience> {
        let endpoint = self.endpoint()?;
        match &self.remote.audience {
            Some(value) => Audience::new(value.as_str())
                .map_err(|err| ConfigError::invalid("remote.audience", err)),
            None => endpoint
                .audience()
                .map_err(|err| ConfigError::invalid("remote.base_url", err)),
        }
    }

    /// The remote tool selector; an index wins over a name.
    ///
    /// # Errors
    ///
    /// Fails when no index is set and the tool name is blank.
    pub fn selector(&self) -> ConfigResult<ToolSelector> {
        match self.remote.tool_index {
            Some(index) => Ok(ToolSelector::by_index(index)),
            None => ToolSelector::by_name(self.remote.tool_name.as_str())
                .map_err(|err| ConfigError::invalid("remote.tool_name", err)),
        }
    }

    /// Per-step deadline for the remote session.
    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }

    /// Inputs for ambient identity resolution.
    #[must_use]
    pub fn auth_options(&self) -> AuthOptions {
        let mut options =
            AuthOptions::default().with_timeout(Duration::from_secs(self.auth.timeout_secs));
        if let Some(token) = &self.auth.static_token {
            options = options.with_static_token(token.clone());
        }
        if let Some(path) = &self.auth.credentials_file {
            options = options.with_credentials_file(path.clone());
        }
        if let Some(host) = &self.auth.metadata_host {
            options = options.with_metadata_host(host.clone());
        }
        options
    }
}

fn parse_bool(field: &'static str, value: &str) -> ConfigResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(field, format!("`{other}` is not a boolean"))),
    }
}
