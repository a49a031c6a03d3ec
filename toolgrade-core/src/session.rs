//! `rmcp`-backed MCP client session.

use std::fmt;

use rmcp::model::{CallToolRequestParam, JsonObject};
use rmcp::service::{ClientInitializeError, RoleClient, RunningService, ServiceError, ServiceExt};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{IntoTransport, StreamableHttpClientTransport, TokioChildProcess};
use serde::Serialize;

use crate::{HttpConfig, StdioConfig, TcpConfig, ToolDefinition, ToolResponse, TransportConfig};

/// Errors emitted by the session driver.
#[derive(Debug)]
pub enum SessionError {
    /// The MCP initialize handshake failed.
    Initialize(Box<ClientInitializeError>),
    /// A request failed at the protocol or transport layer.
    Service(Box<ServiceError>),
    /// The transport could not be opened.
    Io(std::io::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Initialize(error) => write!(f, "initialize failed: {error}"),
            SessionError::Service(error) => write!(f, "request failed: {error}"),
            SessionError::Io(error) => write!(f, "transport io error: {error}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ClientInitializeError> for SessionError {
    fn from(error: ClientInitializeError) -> Self {
        SessionError::Initialize(Box::new(error))
    }
}

impl From<ServiceError> for SessionError {
    fn from(error: ServiceError) -> Self {
        SessionError::Service(Box::new(error))
    }
}

impl From<std::io::Error> for SessionError {
    fn from(error: std::io::Error) -> Self {
        SessionError::Io(error)
    }
}

/// An initialized MCP client session.
pub struct SessionDriver {
    service: RunningService<RoleClient, ()>,
}

impl fmt::Debug for SessionDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDriver").finish_non_exhaustive()
    }
}

impl SessionDriver {
    /// Performs the MCP handshake over an arbitrary `rmcp` transport.
    pub async fn connect_with_transport<T, E, A>(transport: T) -> Result<Self, SessionError>
    where
        T: IntoTransport<RoleClient, E, A>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let service = ().serve(transport).await?;
        Ok(Self { service })
    }

    /// Spawns the configured process and connects over its stdio.
    ///
    /// The child is killed when the transport is dropped, including when a
    /// pending connect is abandoned.
    pub async fn connect_stdio(config: &StdioConfig) -> Result<Self, SessionError> {
        let mut command = tokio::process::Command::new(&config.command);
        command.args(&config.args).envs(&config.env).kill_on_drop(true);
        if let Some(cwd) = &config.cwd {
            command.current_dir(cwd);
        }
        let transport = TokioChildProcess::new(command)?;
        Self::connect_with_transport(transport).await
    }

    /// Opens a TCP socket and speaks newline-delimited JSON-RPC over it.
    pub async fn connect_tcp(config: &TcpConfig) -> Result<Self, SessionError> {
        let stream = tokio::net::TcpStream::connect(config.address.as_str()).await?;
        let (read, write) = stream.into_split();
        Self::connect_with_transport((read, write)).await
    }

    /// Connects to a streamable HTTP endpoint.
    pub async fn connect_http(config: &HttpConfig) -> Result<Self, SessionError> {
        let transport: StreamableHttpClientTransport<reqwest::Client> =
            StreamableHttpClientTransport::from_config(http_transport_config(config));
        Self::connect_with_transport(transport).await
    }

    /// Connects using whichever transport the configuration names.
    pub async fn connect(config: &TransportConfig) -> Result<Self, SessionError> {
        match config {
            TransportConfig::Stdio(stdio) => Self::connect_stdio(stdio).await,
            TransportConfig::Tcp(tcp) => Self::connect_tcp(tcp).await,
            TransportConfig::Http(http) => Self::connect_http(http).await,
        }
    }

    /// Lists every tool the server exposes, following pagination.
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>, SessionError> {
        let tools = self.service.list_all_tools().await?;
        log_io("tools/list", &tools);
        Ok(tools.into_iter().map(ToolDefinition::from).collect())
    }

    /// Sends one `tools/call` request and waits for its reply.
    ///
    /// JSON-RPC errors returned by the server become error responses; only
    /// transport failures surface as `Err`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: JsonObject,
    ) -> Result<ToolResponse, SessionError> {
        let request = CallToolRequestParam {
            name: name.to_string().into(),
            arguments: Some(arguments),
        };
        log_io("tools/call request", &request);
        match self.service.call_tool(request).await {
            Ok(result) => {
                log_io("tools/call response", &result);
                Ok(ToolResponse::from_call_result(result))
            }
            Err(ServiceError::McpError(error)) => {
                log_io("tools/call error", &error);
                Ok(ToolResponse::error(
                    error.message.to_string(),
                    Some(i64::from(error.code.0)),
                ))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Shuts the session down and releases the transport.
    pub async fn close(self) -> Result<(), String> {
        self.service
            .cancel()
            .await
            .map(|_| ())
            .map_err(|error| format!("session task failed during shutdown: {error}"))
    }
}

pub(crate) fn http_transport_config(config: &HttpConfig) -> StreamableHttpClientTransportConfig {
    let mut transport_config = StreamableHttpClientTransportConfig::with_uri(config.url.clone());
    if let Some(token) = config.auth_token.as_deref() {
        let token = token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token);
        transport_config = transport_config.auth_header(token.to_string());
    }
    transport_config
}

pub(crate) fn log_io(label: &str, payload: &impl Serialize) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    match serde_json::to_string(payload) {
        Ok(payload) => log::debug!("toolgrade io {label}: {payload}"),
        Err(error) => log::debug!("toolgrade io {label}: <unserializable: {error}>"),
    }
}

#[cfg(test)]
#[path = "../tests/internal/session_unit_tests.rs"]
mod tests;
