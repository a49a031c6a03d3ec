//! Line-delimited stdio MCP server used by the integration tests.
//!
//! Tools: `echo` returns its arguments, `add` sums `a` and `b`, `fail`
//! reports an in-band error, and `slow` sleeps for `ms` milliseconds.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, ClientJsonRpcMessage, ClientRequest, Content, ErrorData,
    InitializeResult, JsonObject, JsonRpcMessage, JsonRpcResponse, JsonRpcVersion2_0,
    ListToolsResult, RequestId, ServerInfo, ServerJsonRpcMessage, ServerResult, Tool,
};
use serde_json::{json, Value as JsonValue};

fn main() {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let Ok(message) = serde_json::from_str::<ClientJsonRpcMessage>(&line) else {
            continue;
        };
        let Some(reply) = handle_message(message) else {
            continue;
        };
        if let Ok(payload) = serde_json::to_string(&reply) {
            let _ = writeln!(stdout, "{payload}");
            let _ = stdout.flush();
        }
    }
}

fn handle_message(message: ClientJsonRpcMessage) -> Option<ServerJsonRpcMessage> {
    let JsonRpcMessage::Request(request) = message else {
        return None;
    };
    let id = request.id.clone();
    let result = match &request.request {
        ClientRequest::InitializeRequest(_) => {
            let info = ServerInfo::default();
            ServerResult::InitializeResult(InitializeResult {
                protocol_version: info.protocol_version,
                capabilities: info.capabilities,
                server_info: info.server_info,
                instructions: None,
            })
        }
        ClientRequest::ListToolsRequest(_) => ServerResult::ListToolsResult(ListToolsResult {
            tools: tools(),
            next_cursor: None,
            meta: None,
        }),
        ClientRequest::CallToolRequest(call) => match call_tool(&call.params) {
            Ok(result) => ServerResult::CallToolResult(result),
            Err(error) => return Some(ServerJsonRpcMessage::error(error, id)),
        },
        _ => return None,
    };
    Some(respond(id, result))
}

fn call_tool(params: &CallToolRequestParam) -> Result<CallToolResult, ErrorData> {
    let arguments = params.arguments.clone().unwrap_or_default();
    match params.name.as_ref() {
        "echo" => Ok(CallToolResult::structured(JsonValue::Object(arguments))),
        "add" => {
            let a = number(&arguments, "a")?;
            let b = number(&arguments, "b")?;
            Ok(CallToolResult::structured(json!({ "sum": a + b })))
        }
        "fail" => Ok(CallToolResult::error(vec![Content::text(
            "requested failure",
        )])),
        "slow" => {
            let ms = arguments.get("ms").and_then(JsonValue::as_u64).unwrap_or(0);
            std::thread::sleep(Duration::from_millis(ms));
            Ok(CallToolResult::success(vec![Content::text(format!(
                "slept {ms}ms"
            ))]))
        }
        other => Err(ErrorData::invalid_params(
            format!("unknown tool '{other}'"),
            None,
        )),
    }
}

fn number(arguments: &JsonObject, field: &str) -> Result<f64, ErrorData> {
    arguments
        .get(field)
        .and_then(JsonValue::as_f64)
        .ok_or_else(|| ErrorData::invalid_params(format!("'{field}' must be a number"), None))
}

fn tools() -> Vec<Tool> {
    vec![
        tool(
            "echo",
            "Returns its arguments unchanged",
            json!({
                "type": "object",
                "properties": { "message": { "type": "string" } }
            }),
        ),
        tool(
            "add",
            "Adds two numbers",
            json!({
                "type": "object",
                "properties": {
                    "a": { "type": "number" },
                    "b": { "type": "number" }
                },
                "required": ["a", "b"]
            }),
        ),
        tool("fail", "Always reports an error", json!({ "type": "object" })),
        tool(
            "slow",
            "Sleeps before answering",
            json!({
                "type": "object",
                "properties": { "ms": { "type": "integer", "minimum": 0 } }
            }),
        ),
    ]
}

fn tool(name: &str, description: &str, input_schema: JsonValue) -> Tool {
    let input_schema = match input_schema {
        JsonValue::Object(schema) => schema,
        _ => JsonObject::new(),
    };
    Tool {
        name: name.to_string().into(),
        title: None,
        description: Some(description.to_string().into()),
        input_schema: Arc::new(input_schema),
        output_schema: None,
        annotations: None,
        icons: None,
        meta: None,
    }
}

fn respond(id: RequestId, result: ServerResult) -> ServerJsonRpcMessage {
    ServerJsonRpcMessage::Response(JsonRpcResponse {
        jsonrpc: JsonRpcVersion2_0,
        id,
        result,
    })
}
