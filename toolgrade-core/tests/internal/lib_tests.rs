use super::*;
use crate::test_support::{connect_scripted, tool};
use rmcp::model::Content;
use serde_json::json;
use toolgrade_test_support::{self as support, CallReply, ScriptedTransport};

#[test]
fn tool_definition_reads_fields_in_declaration_order() {
    let definition = tool(
        "search",
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search text" },
                "limit": { "type": ["integer", "null"] },
                "filters": {}
            },
            "required": ["query"]
        }),
    );
    assert_eq!(definition.required_fields(), vec!["query".to_string()]);

    let fields = definition.fields();
    let names: Vec<_> = fields.iter().map(|field| field.name.as_str()).collect();
    assert_eq!(names, vec!["query", "limit", "filters"]);
    assert_eq!(fields[0].kind.as_deref(), Some("string"));
    assert_eq!(fields[0].description.as_deref(), Some("Search text"));
    assert!(fields[0].required);
    assert_eq!(fields[1].kind.as_deref(), Some("[\"integer\",\"null\"]"));
    assert!(!fields[1].required);
    assert_eq!(fields[2].kind, None);
}

#[test]
fn tool_definition_without_properties_has_no_fields() {
    let definition = tool("ping", json!({ "type": "object", "required": "nope" }));
    assert!(definition.fields().is_empty());
    assert!(definition.required_fields().is_empty());
}

#[test]
fn tool_definition_converts_from_rmcp_tool() {
    let definition = ToolDefinition::from(support::tool(
        "echo",
        "Echoes input",
        json!({ "type": "object", "properties": { "word": { "type": "string" } } }),
    ));
    assert_eq!(definition.name, "echo");
    assert_eq!(definition.description, "Echoes input");
    assert_eq!(definition.fields()[0].name, "word");

    let mut bare = support::open_tool("bare");
    bare.description = None;
    assert_eq!(ToolDefinition::from(bare).description, "");
}

#[test]
fn call_result_prefers_structured_content() {
    let mut result = CallToolResult::success(vec![Content::text("ignored")]);
    result.structured_content = Some(json!({ "temp": 21 }));
    let response = ToolResponse::from_call_result(result);
    assert_eq!(response.status, ResponseStatus::Success);
    assert_eq!(response.data, Some(json!({ "temp": 21 })));
    assert!(response.error.is_none());
}

#[test]
fn call_result_parses_json_text() {
    let result = CallToolResult::success(vec![Content::text("{\"items\": [1, 2]}")]);
    let response = ToolResponse::from_call_result(result);
    assert_eq!(response.data, Some(json!({ "items": [1, 2] })));
}

#[test]
fn call_result_wraps_plain_and_scalar_text() {
    let result = CallToolResult::success(vec![Content::text("hello"), Content::text("world")]);
    assert_eq!(
        ToolResponse::from_call_result(result).data,
        Some(json!({ "text": "hello\nworld" }))
    );

    let result = CallToolResult::success(vec![Content::text("42")]);
    assert_eq!(
        ToolResponse::from_call_result(result).data,
        Some(json!({ "text": "42" }))
    );

    let result = CallToolResult::success(vec![Content::text("true")]);
    assert_eq!(
        ToolResponse::from_call_result(result).data,
        Some(json!({ "text": "true" }))
    );
}

#[test]
fn empty_call_result_is_null_data() {
    let response = ToolResponse::from_call_result(CallToolResult::success(Vec::new()));
    assert_eq!(response.status, ResponseStatus::Success);
    assert_eq!(response.data, Some(JsonValue::Null));
}

#[test]
fn in_band_errors_keep_text_and_structured_content() {
    let mut result = CallToolResult::error(vec![Content::text("city not found")]);
    result.structured_content = Some(json!({ "city": "Atlantis" }));
    let response = ToolResponse::from_call_result(result);
    assert_eq!(response.status, ResponseStatus::Error);
    assert_eq!(response.data, Some(json!({ "city": "Atlantis" })));
    let error = response.error.expect("error");
    assert_eq!(error.message, "city not found");
    assert_eq!(error.code, None);

    let response = ToolResponse::from_call_result(CallToolResult::error(Vec::new()));
    assert_eq!(
        response.error.expect("error").message,
        "tool reported an error"
    );
}

#[test]
fn test_case_serializes_camel_case() {
    let case = TestCase {
        id: "case-1".to_string(),
        tool_name: "get_weather".to_string(),
        description: "weather in Oslo".to_string(),
        inputs: json!({ "city": "Oslo" }).as_object().cloned().expect("inputs"),
        natural_language_context: "What's the weather in Oslo?".to_string(),
        expected_outcome: ExpectedOutcome {
            status: ResponseStatus::Success,
            validation_rules: vec![
                ValidationRule::has_property("forecast", "has a forecast"),
                ValidationRule::custom("is_object", ""),
            ],
        },
    };
    let value = serde_json::to_value(&case).expect("serialize");
    assert_eq!(value["toolName"], json!("get_weather"));
    assert_eq!(
        value["naturalLanguageContext"],
        json!("What's the weather in Oslo?")
    );
    assert_eq!(value["expectedOutcome"]["status"], json!("success"));
    let rules = &value["expectedOutcome"]["validationRules"];
    assert_eq!(
        rules[0],
        json!({ "type": "hasProperty", "target": "forecast", "message": "has a forecast" })
    );
    assert_eq!(
        rules[1],
        json!({ "type": "custom", "value": "is_object", "message": "" })
    );

    let parsed: TestCase = serde_json::from_value(value).expect("deserialize");
    assert_eq!(parsed, case);
}

#[test]
fn rule_defaults_apply_when_fields_are_missing() {
    let rule: ValidationRule =
        serde_json::from_value(json!({ "type": "matches" })).expect("rule");
    assert_eq!(rule.kind, RuleKind::Matches);
    assert_eq!(rule.target, None);
    assert_eq!(rule.value, None);
    assert_eq!(rule.message, "");
    assert_eq!(RuleKind::HasProperty.as_str(), "hasProperty");
}

#[test]
fn transport_configs_are_tagged_by_type() {
    let stdio: TransportConfig = toml::from_str(
        "type = \"stdio\"\ncommand = \"python3\"\nargs = [\"server.py\"]\n",
    )
    .expect("stdio");
    assert_eq!(
        stdio,
        TransportConfig::Stdio(StdioConfig::new("python3").with_args(["server.py"]))
    );
    assert_eq!(stdio.label(), "stdio");

    let http: TransportConfig = serde_json::from_value(json!({
        "type": "http",
        "url": "https://tools.example.com/mcp",
        "auth_token": "secret"
    }))
    .expect("http");
    assert_eq!(http.label(), "http");

    let tcp = TransportConfig::Tcp(TcpConfig {
        address: "127.0.0.1:9000".to_string(),
    });
    assert_eq!(
        serde_json::to_value(&tcp).expect("serialize"),
        json!({ "type": "tcp", "address": "127.0.0.1:9000" })
    );
}

#[test]
fn registry_lists_names_sorted_and_replaces_entries() {
    let mut registry = ServerRegistry::new()
        .with_server("weather", TransportConfig::Stdio(StdioConfig::new("weather-mcp")))
        .with_server(
            "files",
            TransportConfig::Tcp(TcpConfig {
                address: "localhost:7000".to_string(),
            }),
        );
    assert!(!registry.is_empty());
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["files", "weather"]);

    registry.insert("weather", TransportConfig::Stdio(StdioConfig::new("weather-v2")));
    assert_eq!(
        registry.get("weather"),
        Some(&TransportConfig::Stdio(StdioConfig::new("weather-v2")))
    );
    assert_eq!(registry.get("missing"), None);
    assert!(ServerRegistry::new().is_empty());
}

#[tokio::test]
async fn session_lists_and_calls_tools_over_a_transport() {
    let transport = ScriptedTransport::new(vec![support::open_tool("echo")]);
    let requests = transport.request_log();
    let session = connect_scripted(transport).await.expect("connect");

    let tools = session.list_tools().await.expect("list tools");
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "echo");

    let inputs = json!({ "word": "hi" }).as_object().cloned().expect("inputs");
    let response = session.call_tool("echo", inputs).await.expect("call");
    assert_eq!(response, ToolResponse::success(json!({ "word": "hi" })));

    session.close().await.expect("close");
    assert!(requests.lock().expect("requests").len() >= 3);
}

#[tokio::test]
async fn protocol_errors_become_error_responses_with_codes() {
    let transport = ScriptedTransport::new(vec![support::open_tool("strict")]).on_call(|_| {
        CallReply::Error(ErrorData::invalid_params("missing field 'city'", None))
    });
    let session = connect_scripted(transport).await.expect("connect");
    let response = session
        .call_tool("strict", JsonObject::new())
        .await
        .expect("call");
    assert_eq!(response.status, ResponseStatus::Error);
    let error = response.error.expect("error");
    assert_eq!(error.message, "missing field 'city'");
    assert_eq!(error.code, Some(i64::from(ErrorCode::INVALID_PARAMS.0)));
}
