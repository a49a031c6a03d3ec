//! The connection capability the orchestrator drives, and its `rmcp`
//! implementation.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rmcp::model::JsonObject;
use serde::Serialize;

use crate::session::{SessionDriver, SessionError};
use crate::target::resolve_target;
use crate::{ServerRegistry, ToolDefinition, ToolResponse, TransportConfig};

/// Lifecycle of a single connection instance.
///
/// `Connecting` falls back to `Unconnected` when establishment fails;
/// `Disconnected` is terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Connected,
    Disconnected,
}

/// Failures while establishing or using a connection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConnectionError {
    /// The address names no registry entry, URL, socket, script, or package.
    NoServerIdentified(String),
    /// The server process could not be started.
    Spawn(String),
    /// The transport or MCP handshake failed.
    Transport(String),
    /// Establishment did not settle in time.
    Timeout(Duration),
    /// The operation requires a live connection.
    NotConnected,
    /// `connect` was called on a live connection.
    AlreadyConnected,
    /// `connect` was called after `disconnect`.
    Terminated,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::NoServerIdentified(address) => {
                write!(f, "no tool server identified by '{address}'")
            }
            ConnectionError::Spawn(reason) => write!(f, "failed to start server: {reason}"),
            ConnectionError::Transport(reason) => write!(f, "transport error: {reason}"),
            ConnectionError::Timeout(timeout) => {
                write!(f, "connection timed out after {}ms", timeout.as_millis())
            }
            ConnectionError::NotConnected => f.write_str("not connected"),
            ConnectionError::AlreadyConnected => f.write_str("already connected"),
            ConnectionError::Terminated => {
                f.write_str("connection was closed; create a new connection to reconnect")
            }
        }
    }
}

impl std::error::Error for ConnectionError {}

/// A live channel to one tool server.
///
/// Implementations must keep `disconnect` idempotent and must report
/// invocation failures as error [`ToolResponse`]s rather than `Err`.
pub trait Connection: Send {
    /// Resolves `address` (consulting `registry`) and establishes the channel.
    fn connect(
        &mut self,
        address: &str,
        registry: &ServerRegistry,
    ) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Queries the server's tool list.
    fn list_tools(
        &mut self,
    ) -> impl Future<Output = Result<Vec<ToolDefinition>, ConnectionError>> + Send;

    /// Calls one tool and awaits its single reply.
    ///
    /// The returned future may be dropped mid-call when a test times out.
    /// Dropping it must only stop the wait: the call is not cancelled and the
    /// connection stays usable for the next invocation.
    fn invoke(&mut self, tool: &str, inputs: JsonObject)
        -> impl Future<Output = ToolResponse> + Send;

    /// Releases the channel. Safe to call in any state, any number of times.
    fn disconnect(&mut self) -> impl Future<Output = ()> + Send;

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;
}

/// [`Connection`] backed by an `rmcp` client session.
#[derive(Debug)]
pub struct ServerConnection {
    state: ConnectionState,
    session: Option<SessionDriver>,
    transport: Option<TransportConfig>,
    tools: Vec<ToolDefinition>,
}

impl Default for ServerConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConnection {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Unconnected,
            session: None,
            transport: None,
            tools: Vec::new(),
        }
    }

    /// Wraps an already initialized session, e.g. one opened over a custom
    /// transport with [`SessionDriver::connect_with_transport`].
    pub fn attach(session: SessionDriver) -> Self {
        Self {
            state: ConnectionState::Connected,
            session: Some(session),
            transport: None,
            tools: Vec::new(),
        }
    }

    /// Transport chosen by the last connect attempt.
    pub fn transport(&self) -> Option<&TransportConfig> {
        self.transport.as_ref()
    }

    /// Tools returned by the most recent discovery.
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    fn guard_connect(&self) -> Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Unconnected => Ok(()),
            ConnectionState::Connecting | ConnectionState::Connected => {
                Err(ConnectionError::AlreadyConnected)
            }
            ConnectionState::Disconnected => Err(ConnectionError::Terminated),
        }
    }
}

impl Connection for ServerConnection {
    async fn connect(
        &mut self,
        address: &str,
        registry: &ServerRegistry,
    ) -> Result<(), ConnectionError> {
        self.guard_connect()?;
        let resolved = resolve_target(address, registry)?;
        log::debug!(
            "connecting to '{address}' over {} ({:?})",
            resolved.transport.label(),
            resolved.source
        );
        self.state = ConnectionState::Connecting;
        self.transport = Some(resolved.transport.clone());
        match SessionDriver::connect(&resolved.transport).await {
            Ok(session) => {
                self.session = Some(session);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(error) => {
                self.state = ConnectionState::Unconnected;
                Err(connect_error(&resolved.transport, error))
            }
        }
    }

    async fn list_tools(&mut self) -> Result<Vec<ToolDefinition>, ConnectionError> {
        let session = self.session.as_ref().ok_or(ConnectionError::NotConnected)?;
        let tools = session
            .list_tools()
            .await
            .map_err(|error| ConnectionError::Transport(error.to_string()))?;
        self.tools = tools.clone();
        Ok(tools)
    }

    async fn invoke(&mut self, tool: &str, inputs: JsonObject) -> ToolResponse {
        let Some(session) = self.session.as_ref() else {
            return ToolResponse::error(ConnectionError::NotConnected.to_string(), None);
        };
        match session.call_tool(tool, inputs).await {
            Ok(response) => response,
            Err(error) => ToolResponse::error(error.to_string(), None),
        }
    }

    async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(error) = session.close().await {
                log::warn!("error while closing session: {error}");
            }
        }
        self.state = ConnectionState::Disconnected;
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}

fn connect_error(transport: &TransportConfig, error: SessionError) -> ConnectionError {
    match (transport, error) {
        (TransportConfig::Stdio(config), SessionError::Io(error)) => {
            ConnectionError::Spawn(format!("{}: {error}", config.command))
        }
        (_, error) => ConnectionError::Transport(error.to_string()),
    }
}

#[cfg(test)]
#[path = "../tests/internal/connection_tests.rs"]
mod tests;
