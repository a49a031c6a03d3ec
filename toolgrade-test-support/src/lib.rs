//! Scripted `rmcp` transports and tool builders shared by toolgrade tests.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use ctor::ctor;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ClientJsonRpcMessage, ClientRequest, ErrorData,
    InitializeResult, JsonRpcMessage, JsonRpcResponse, JsonRpcVersion2_0, ListToolsResult,
    RequestId, ServerInfo, ServerJsonRpcMessage, ServerResult, Tool,
};
use rmcp::service::RoleClient;
use rmcp::transport::Transport;
use serde_json::{json, Value as JsonValue};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

#[ctor]
fn init_test_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .is_test(true)
        .try_init();
}

/// Creates a fresh directory under the system temp dir.
pub fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "toolgrade-{name}-{}-{nanos}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

/// Builds a tool with the given input schema and description.
pub fn tool(name: &str, description: &str, input_schema: JsonValue) -> Tool {
    Tool {
        name: name.to_string().into(),
        title: None,
        description: Some(description.to_string().into()),
        input_schema: Arc::new(
            input_schema
                .as_object()
                .cloned()
                .expect("input schema object"),
        ),
        output_schema: None,
        annotations: None,
        icons: None,
        meta: None,
    }
}

/// A tool accepting any object.
pub fn open_tool(name: &str) -> Tool {
    tool(name, "accepts any arguments", json!({ "type": "object" }))
}

/// How the scripted server answers one `tools/call`.
#[derive(Clone, Debug)]
pub enum CallReply {
    /// Reply with this result.
    Result(CallToolResult),
    /// Reply with a JSON-RPC error.
    Error(ErrorData),
    /// Never reply.
    Hang,
}

type CallHandler = Arc<dyn Fn(&CallToolRequestParam) -> CallReply + Send + Sync>;

/// Error returned by [`ScriptedTransport::breaking_on_list`].
#[derive(Debug)]
pub struct TransportError(pub &'static str);

impl std::fmt::Display for TransportError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0)
    }
}

impl std::error::Error for TransportError {}

/// An in-memory MCP server speaking through `rmcp`'s client transport trait.
///
/// Answers `initialize`, `tools/list`, and `tools/call`. By default a call
/// echoes its arguments back as structured content.
pub struct ScriptedTransport {
    tools: Vec<Tool>,
    list_error: Option<ErrorData>,
    break_on_list: bool,
    on_call: CallHandler,
    requests: Arc<Mutex<Vec<ClientJsonRpcMessage>>>,
    responses: Arc<AsyncMutex<mpsc::UnboundedReceiver<ServerJsonRpcMessage>>>,
    response_tx: mpsc::UnboundedSender<ServerJsonRpcMessage>,
}

impl ScriptedTransport {
    pub fn new(tools: Vec<Tool>) -> Self {
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        Self {
            tools,
            list_error: None,
            break_on_list: false,
            on_call: Arc::new(|request| {
                let arguments = request.arguments.clone().unwrap_or_default();
                CallReply::Result(CallToolResult::structured(JsonValue::Object(arguments)))
            }),
            requests: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(AsyncMutex::new(response_rx)),
            response_tx,
        }
    }

    /// Answers `tools/list` with a JSON-RPC error.
    pub fn with_list_error(mut self, error: ErrorData) -> Self {
        self.list_error = Some(error);
        self
    }

    /// Fails the transport send of `tools/list`.
    pub fn breaking_on_list(mut self) -> Self {
        self.break_on_list = true;
        self
    }

    /// Replaces the `tools/call` handler.
    pub fn on_call<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CallToolRequestParam) -> CallReply + Send + Sync + 'static,
    {
        self.on_call = Arc::new(handler);
        self
    }

    /// Every message the client sent, in order.
    pub fn request_log(&self) -> Arc<Mutex<Vec<ClientJsonRpcMessage>>> {
        Arc::clone(&self.requests)
    }

    fn reply_to(&self, id: RequestId, request: &ClientRequest) -> Option<ServerJsonRpcMessage> {
        match request {
            ClientRequest::InitializeRequest(_) => Some(response(
                id,
                ServerResult::InitializeResult(initialize_result()),
            )),
            ClientRequest::ListToolsRequest(_) => Some(match &self.list_error {
                Some(error) => ServerJsonRpcMessage::error(error.clone(), id),
                None => response(
                    id,
                    ServerResult::ListToolsResult(ListToolsResult {
                        tools: self.tools.clone(),
                        next_cursor: None,
                        meta: None,
                    }),
                ),
            }),
            ClientRequest::CallToolRequest(call) => match (self.on_call)(&call.params) {
                CallReply::Result(result) => {
                    Some(response(id, ServerResult::CallToolResult(result)))
                }
                CallReply::Error(error) => Some(ServerJsonRpcMessage::error(error, id)),
                CallReply::Hang => None,
            },
            _ => None,
        }
    }
}

impl Transport<RoleClient> for ScriptedTransport {
    type Error = TransportError;

    fn send(
        &mut self,
        item: ClientJsonRpcMessage,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send + 'static {
        self.requests.lock().expect("requests").push(item.clone());
        if let JsonRpcMessage::Request(request) = &item {
            if self.break_on_list
                && matches!(request.request, ClientRequest::ListToolsRequest(_))
            {
                return std::future::ready(Err(TransportError("tools/list transport failure")));
            }
            if let Some(reply) = self.reply_to(request.id.clone(), &request.request) {
                let _ = self.response_tx.send(reply);
            }
        }
        std::future::ready(Ok(()))
    }

    fn receive(&mut self) -> impl std::future::Future<Output = Option<ServerJsonRpcMessage>> {
        let responses = Arc::clone(&self.responses);
        async move {
            let mut receiver = responses.lock().await;
            receiver.recv().await
        }
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

fn response(id: RequestId, result: ServerResult) -> ServerJsonRpcMessage {
    ServerJsonRpcMessage::Response(JsonRpcResponse {
        jsonrpc: JsonRpcVersion2_0,
        id,
        result,
    })
}

fn initialize_result() -> InitializeResult {
    let info = ServerInfo::default();
    InitializeResult {
        protocol_version: info.protocol_version,
        capabilities: info.capabilities,
        server_info: info.server_info,
        instructions: None,
    }
}
