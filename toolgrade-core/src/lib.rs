//! Public API types for configuring and reporting toolgrade campaigns.
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rmcp::model::{CallToolResult, JsonObject, Tool};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod connection;
pub mod generator;
pub mod llm;
pub mod runner;
pub mod session;
pub mod target;
pub mod validation;

pub use connection::{Connection, ConnectionError, ConnectionState, ServerConnection};
pub use generator::{GenerationError, GeneratorOptions, TestGenerator};
pub use llm::{
    extract_json, AnthropicClient, AnthropicConfig, LanguageModel, ModelClient, ModelError,
    OpenAiClient, OpenAiConfig,
};
pub use rmcp::model::{ErrorCode, ErrorData};
pub use rmcp::service::{ClientInitializeError, ServiceError};
pub use runner::{
    run_test_cases, CampaignConfig, CampaignOutcome, Orchestrator, ReportSink, RunError,
    RunReport, RunSummary, ServerReport,
};
pub use session::{SessionDriver, SessionError};
pub use target::{resolve_target, ResolvedTarget, TargetSource};
pub use validation::{
    builtin_predicates, resolve_path, CustomPredicate, ResponseValidator, ValidationOutcome,
};

/// Configuration for a stdio-based MCP endpoint.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StdioConfig {
    /// Command to execute for the MCP server.
    pub command: String,
    /// Command-line arguments passed to the MCP server.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables to add or override for the MCP process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Optional working directory for the MCP process.
    #[serde(default)]
    pub cwd: Option<String>,
}

impl StdioConfig {
    /// Creates a stdio configuration with defaults for args, env, and cwd.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Appends command-line arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Configuration for a raw socket MCP endpoint (`host:port`).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Socket address in `host:port` form.
    pub address: String,
}

/// Configuration for a streamable HTTP MCP endpoint.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// The HTTP endpoint URL for MCP requests.
    pub url: String,
    /// Optional bearer token to attach to Authorization headers.
    #[serde(default)]
    pub auth_token: Option<String>,
}

/// Transport options for connecting to an MCP endpoint.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Spawn an MCP server process and talk over its stdio.
    Stdio(StdioConfig),
    /// Open a TCP socket carrying newline-delimited JSON-RPC.
    Tcp(TcpConfig),
    /// Use streamable HTTP to communicate with an MCP server.
    Http(HttpConfig),
}

impl TransportConfig {
    /// Short transport label used in logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            TransportConfig::Stdio(_) => "stdio",
            TransportConfig::Tcp(_) => "tcp",
            TransportConfig::Http(_) => "http",
        }
    }
}

/// Named tool-server entries that addresses can refer to.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerRegistry {
    servers: BTreeMap<String, TransportConfig>,
}

impl ServerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a named entry.
    pub fn with_server(mut self, name: impl Into<String>, transport: TransportConfig) -> Self {
        self.insert(name, transport);
        self
    }

    /// Adds or replaces a named entry in place.
    pub fn insert(&mut self, name: impl Into<String>, transport: TransportConfig) {
        self.servers.insert(name.into(), transport);
    }

    /// Looks up a named entry.
    pub fn get(&self, name: &str) -> Option<&TransportConfig> {
        self.servers.get(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.servers.keys().map(String::as_str)
    }

    /// Returns whether no servers are registered.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Predicate callback used to decide whether a discovered tool is tested.
pub type ToolNamePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// One field of a tool's parameter schema.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ParameterField {
    /// Property name.
    pub name: String,
    /// Declared JSON type, when the schema names one.
    pub kind: Option<String>,
    /// Property description, when present.
    pub description: Option<String>,
    /// Whether the property is listed in `required`.
    pub required: bool,
}

/// A tool discovered on a server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Tool name, unique within a server.
    pub name: String,
    /// Human-readable description; empty when the server provides none.
    pub description: String,
    /// JSON Schema describing the tool arguments.
    pub input_schema: JsonObject,
}

impl ToolDefinition {
    /// Creates a tool definition from its parts.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: JsonObject,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Names listed in the schema's `required` array.
    pub fn required_fields(&self) -> Vec<String> {
        self.input_schema
            .get("required")
            .and_then(JsonValue::as_array)
            .map(|required| {
                required
                    .iter()
                    .filter_map(JsonValue::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Top-level properties of the schema in declaration order.
    pub fn fields(&self) -> Vec<ParameterField> {
        let required = self.required_fields();
        let Some(properties) = self
            .input_schema
            .get("properties")
            .and_then(JsonValue::as_object)
        else {
            return Vec::new();
        };
        properties
            .iter()
            .map(|(name, schema)| ParameterField {
                name: name.clone(),
                kind: schema
                    .get("type")
                    .map(|kind| match kind {
                        JsonValue::String(kind) => kind.clone(),
                        other => other.to_string(),
                    }),
                description: schema
                    .get("description")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string),
                required: required.iter().any(|field| field == name),
            })
            .collect()
    }
}

impl From<Tool> for ToolDefinition {
    fn from(tool: Tool) -> Self {
        Self {
            name: tool.name.to_string(),
            description: tool
                .description
                .map(|description| description.to_string())
                .unwrap_or_default(),
            input_schema: tool.input_schema.as_ref().clone(),
        }
    }
}

/// Whether a tool call succeeded or reported an error.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// The call completed normally.
    Success,
    /// The call reported an error, in-band or at the protocol level.
    Error,
}

impl ResponseStatus {
    /// Wire label for the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Success => "success",
            ResponseStatus::Error => "error",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of validation rule kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleKind {
    /// Substring or element membership.
    Contains,
    /// `/regex/` match or deep structural equality.
    Matches,
    /// The target path exists, whatever its value.
    HasProperty,
    /// Caller-registered predicate over the full response data.
    Custom,
}

impl RuleKind {
    /// Wire label for the rule kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Contains => "contains",
            RuleKind::Matches => "matches",
            RuleKind::HasProperty => "hasProperty",
            RuleKind::Custom => "custom",
        }
    }
}

/// A declarative check applied to a tool response.
///
/// `target` is a dotted path into the response data. `value` carries the
/// expected literal; for `custom` rules it names the registered predicate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Rule kind.
    #[serde(rename = "type")]
    pub kind: RuleKind,
    /// Dotted field path into the response data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Expected literal (or predicate name for `custom`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
    /// User-facing failure explanation.
    #[serde(default)]
    pub message: String,
}

impl ValidationRule {
    /// Builds a `contains` rule.
    pub fn contains(target: &str, value: JsonValue, message: &str) -> Self {
        Self::new(RuleKind::Contains, Some(target), Some(value), message)
    }

    /// Builds a `matches` rule.
    pub fn matches(target: &str, value: JsonValue, message: &str) -> Self {
        Self::new(RuleKind::Matches, Some(target), Some(value), message)
    }

    /// Builds a `hasProperty` rule.
    pub fn has_property(target: &str, message: &str) -> Self {
        Self::new(RuleKind::HasProperty, Some(target), None, message)
    }

    /// Builds a `custom` rule naming a registered predicate.
    pub fn custom(predicate: &str, message: &str) -> Self {
        Self::new(
            RuleKind::Custom,
            None,
            Some(JsonValue::String(predicate.to_string())),
            message,
        )
    }

    fn new(
        kind: RuleKind,
        target: Option<&str>,
        value: Option<JsonValue>,
        message: &str,
    ) -> Self {
        Self {
            kind,
            target: target.map(str::to_string),
            value,
            message: message.to_string(),
        }
    }
}

/// Expected result of executing a test case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedOutcome {
    /// Status the tool is expected to report.
    pub status: ResponseStatus,
    /// Rules evaluated, in order, when the expected status is `success`.
    #[serde(default)]
    pub validation_rules: Vec<ValidationRule>,
}

/// One synthesized test for a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    /// Unique identifier.
    pub id: String,
    /// Tool under test.
    pub tool_name: String,
    /// What this case checks.
    pub description: String,
    /// Arguments sent to the tool.
    pub inputs: JsonObject,
    /// The natural-language request this case was derived from.
    pub natural_language_context: String,
    /// Expected status and validation rules.
    pub expected_outcome: ExpectedOutcome,
}

/// Error payload attached to a failed tool response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    /// Error description.
    pub message: String,
    /// Protocol error code, when the failure came from the JSON-RPC layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
}

/// Normalized result of one tool invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    /// Success or error.
    pub status: ResponseStatus,
    /// Structured payload, when the call produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    /// Error details for error responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResponse {
    /// A successful response carrying `data`.
    pub fn success(data: JsonValue) -> Self {
        Self {
            status: ResponseStatus::Success,
            data: Some(data),
            error: None,
        }
    }

    /// An error response.
    pub fn error(message: impl Into<String>, code: Option<i64>) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: None,
            error: Some(ToolError {
                message: message.into(),
                code,
            }),
        }
    }

    /// Normalizes an MCP `tools/call` result.
    ///
    /// Structured content wins; otherwise joined text that parses as a JSON
    /// object or array is used as is, and anything else becomes `{"text": ...}`.
    pub fn from_call_result(result: CallToolResult) -> Self {
        let text = result
            .content
            .iter()
            .filter_map(|content| content.as_text().map(|text| text.text.as_str()))
            .collect::<Vec<_>>()
            .join("\n");
        if result.is_error == Some(true) {
            let message = if text.is_empty() {
                "tool reported an error".to_string()
            } else {
                text
            };
            let mut response = Self::error(message, None);
            response.data = result.structured_content;
            return response;
        }
        let data = match result.structured_content {
            Some(structured) => structured,
            None if text.is_empty() && result.content.is_empty() => JsonValue::Null,
            None => serde_json::from_str::<JsonValue>(&text)
                .ok()
                .filter(|value| value.is_object() || value.is_array())
                .unwrap_or_else(|| serde_json::json!({ "text": text })),
        };
        Self::success(data)
    }
}

/// Graded outcome of one test case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// The executed test case.
    pub test_case: TestCase,
    /// Whether the response satisfied the expected outcome.
    pub passed: bool,
    /// The tool response; absent after a timeout or caught failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ToolResponse>,
    /// Every reason the case failed, in evaluation order.
    pub validation_errors: Vec<String>,
    /// Wall-clock execution time of the invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

#[cfg(test)]
#[path = "../tests/internal/test_support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "../tests/internal/lib_tests.rs"]
mod tests;
