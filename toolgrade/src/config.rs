use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use toolgrade_core::{
    AnthropicClient, AnthropicConfig, ModelClient, OpenAiClient, OpenAiConfig, ServerRegistry,
    TransportConfig,
};

pub const DEFAULT_CONFIG: &str = include_str!("default_toolgrade.toml");
pub const CONFIG_FILE_NAME: &str = "toolgrade.toml";

/// Contents of a `toolgrade.toml` file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolgradeConfig {
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub servers: BTreeMap<String, TransportConfig>,
}

impl ToolgradeConfig {
    pub fn registry(&self) -> ServerRegistry {
        let mut registry = ServerRegistry::new();
        for (name, transport) in &self.servers {
            registry.insert(name.clone(), transport.clone());
        }
        registry
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSection {
    #[serde(default)]
    pub tests_per_tool: Option<usize>,
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default)]
    pub test_timeout_ms: Option<u64>,
    /// Default server selection for `toolgrade run`.
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default)]
    pub tool_allowlist: Vec<String>,
    #[serde(default)]
    pub tool_blocklist: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[default]
    Anthropic,
    OpenAi,
}

impl ModelProvider {
    fn default_api_key_env(self) -> &'static str {
        match self {
            ModelProvider::Anthropic => "ANTHROPIC_API_KEY",
            ModelProvider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSection {
    #[serde(default)]
    pub provider: ModelProvider,
    #[serde(default)]
    pub model: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl ModelSection {
    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env())
    }

    /// Builds the configured client, reading the API key through `lookup`.
    pub fn client(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<ModelClient, String> {
        let key_env = self.api_key_env();
        let api_key = lookup(key_env)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| format!("missing API key: set the {key_env} environment variable"))?;
        let timeout = self.request_timeout_ms.map(Duration::from_millis);
        let client = match self.provider {
            ModelProvider::Anthropic => {
                let mut config = AnthropicConfig::new(api_key);
                if let Some(model) = &self.model {
                    config.model = model.clone();
                }
                if let Some(base_url) = &self.base_url {
                    config.base_url = base_url.clone();
                }
                if let Some(max_tokens) = self.max_tokens {
                    config.max_tokens = max_tokens;
                }
                if let Some(timeout) = timeout {
                    config.request_timeout = timeout;
                }
                AnthropicClient::new(config).map(ModelClient::Anthropic)
            }
            ModelProvider::OpenAi => {
                let mut config = OpenAiConfig::new(api_key);
                if let Some(model) = &self.model {
                    config.model = model.clone();
                }
                if let Some(base_url) = &self.base_url {
                    config.base_url = base_url.clone();
                }
                if let Some(max_tokens) = self.max_tokens {
                    config.max_tokens = max_tokens;
                }
                if let Some(timeout) = timeout {
                    config.request_timeout = timeout;
                }
                OpenAiClient::new(config).map(ModelClient::OpenAi)
            }
        };
        client.map_err(|error| format!("failed to build model client: {error}"))
    }
}

/// Where the effective configuration came from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigSource {
    File(PathBuf),
    BuiltIn,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::BuiltIn => f.write_str("built-in defaults"),
        }
    }
}

pub fn parse_config(raw: &str, origin: &str) -> Result<ToolgradeConfig, String> {
    toml::from_str(raw).map_err(|error| format!("invalid config {origin}: {error}"))
}

pub fn read_config(path: &Path) -> Result<ToolgradeConfig, String> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("failed to read config {}: {error}", path.display()))?;
    parse_config(&raw, &path.display().to_string())
}

/// Loads `explicit` when given, otherwise the first config found by
/// [`discover_config`], otherwise the built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<(ToolgradeConfig, ConfigSource), String> {
    if let Some(path) = explicit {
        return Ok((read_config(path)?, ConfigSource::File(path.to_path_buf())));
    }
    let cwd = std::env::current_dir()
        .map_err(|error| format!("failed to resolve current directory: {error}"))?;
    match discover_config(&cwd, user_config_dir().as_deref()) {
        Some(path) => Ok((read_config(&path)?, ConfigSource::File(path))),
        None => Ok((
            parse_config(DEFAULT_CONFIG, "built-in defaults")?,
            ConfigSource::BuiltIn,
        )),
    }
}

/// Searches `start` and its parents, stopping at the first directory that
/// holds `.git`, then falls back to `user_dir`.
pub fn discover_config(start: &Path, user_dir: Option<&Path>) -> Option<PathBuf> {
    for dir in start.ancestors() {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if dir.join(".git").exists() {
            break;
        }
    }
    user_dir
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .filter(|candidate| candidate.is_file())
}

fn user_config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}
