use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use serde_json::json;

use super::*;
use crate::test_support::{
    open_tool, unit_replies, MockBehavior, MockConnection, ScriptedModel, ScriptedServer,
};
use crate::{
    Connection, ConnectionError, ExpectedOutcome, ResponseStatus, ResponseValidator,
    ServerRegistry, TestCase, TestGenerator, ToolResponse, ValidationRule,
};

fn case(id: &str, tool: &str, inputs: serde_json::Value, rules: Vec<ValidationRule>) -> TestCase {
    TestCase {
        id: id.to_string(),
        tool_name: tool.to_string(),
        description: format!("case {id}"),
        inputs: inputs.as_object().cloned().expect("inputs object"),
        natural_language_context: "context".to_string(),
        expected_outcome: ExpectedOutcome {
            status: ResponseStatus::Success,
            validation_rules: rules,
        },
    }
}

fn config() -> CampaignConfig {
    CampaignConfig::new()
        .with_tests_per_tool(1)
        .with_connect_timeout(Duration::from_millis(200))
        .with_test_timeout(Duration::from_millis(50))
}

fn servers(entries: Vec<(&str, ScriptedServer)>) -> BTreeMap<String, ScriptedServer> {
    entries
        .into_iter()
        .map(|(name, server)| (name.to_string(), server))
        .collect()
}

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[derive(Default)]
struct CollectingSink {
    seen: Mutex<Vec<(String, usize)>>,
}

impl ReportSink for CollectingSink {
    fn record(&self, report: &ServerReport) {
        self.seen
            .lock()
            .expect("seen")
            .push((report.server.clone(), report.results.len()));
    }
}

#[tokio::test]
async fn every_case_yields_one_result_in_order() {
    let (factory, log) = MockConnection::factory(servers(vec![(
        "srv",
        ScriptedServer::with_tools(vec![open_tool("echo")]),
    )]));
    let mut connection = factory();
    connection
        .connect("srv", &ServerRegistry::new())
        .await
        .expect("connect");
    let cases: Vec<TestCase> = (0..5)
        .map(|index| case(&format!("c{index}"), "echo", json!({ "n": index }), Vec::new()))
        .collect();

    let results = run_test_cases(
        &mut connection,
        &cases,
        &ResponseValidator::default(),
        Duration::from_secs(1),
    )
    .await;

    assert_eq!(results.len(), cases.len());
    for (result, case) in results.iter().zip(&cases) {
        assert_eq!(result.test_case.id, case.id);
        assert!(result.passed);
        assert!(result.execution_time_ms.is_some());
    }
    assert_eq!(log.lock().expect("log").invocations.len(), 5);
}

#[tokio::test]
async fn hung_invocation_times_out_and_execution_continues() {
    let (factory, _log) = MockConnection::factory(servers(vec![(
        "srv",
        ScriptedServer::with_tools(vec![open_tool("slow"), open_tool("echo")])
            .behavior("slow", MockBehavior::Hang),
    )]));
    let mut connection = factory();
    connection
        .connect("srv", &ServerRegistry::new())
        .await
        .expect("connect");
    let cases = vec![
        case("slow-1", "slow", json!({}), Vec::new()),
        case("echo-1", "echo", json!({ "word": "hi" }), vec![ValidationRule::contains("word", json!("hi"), "echoed")]),
    ];

    let results = tokio::time::timeout(
        Duration::from_secs(5),
        run_test_cases(&mut connection, &cases, &ResponseValidator::default(), Duration::from_millis(30)),
    )
    .await
    .expect("execution must not block on the hung call");

    assert_eq!(results.len(), 2);
    assert!(!results[0].passed);
    assert!(results[0].response.is_none());
    assert_eq!(results[0].validation_errors, vec!["test timed out after 30ms".to_string()]);
    assert!(results[1].passed);
}

#[tokio::test]
async fn panicking_invocation_becomes_failing_result() {
    let (factory, _log) = MockConnection::factory(servers(vec![(
        "srv",
        ScriptedServer::with_tools(vec![open_tool("boom"), open_tool("echo")])
            .behavior("boom", MockBehavior::Panic("tool handler crashed")),
    )]));
    let mut connection = factory();
    connection
        .connect("srv", &ServerRegistry::new())
        .await
        .expect("connect");
    let cases = vec![
        case("boom-1", "boom", json!({}), Vec::new()),
        case("echo-1", "echo", json!({}), Vec::new()),
    ];

    let results = run_test_cases(&mut connection, &cases, &ResponseValidator::default(), Duration::from_secs(1)).await;

    assert_eq!(results.len(), 2);
    assert!(!results[0].passed);
    assert!(results[0].response.is_none());
    assert_eq!(
        results[0].validation_errors,
        vec!["test execution failed unexpectedly: tool handler crashed".to_string()]
    );
    assert!(results[1].passed);
}

#[tokio::test]
async fn invocation_errors_are_graded_not_thrown() {
    let (factory, _log) = MockConnection::factory(servers(vec![(
        "srv",
        ScriptedServer::with_tools(vec![open_tool("fail")]).behavior(
            "fail",
            MockBehavior::Respond(ToolResponse::error("disk full", Some(-32603))),
        ),
    )]));
    let mut connection = factory();
    connection
        .connect("srv", &ServerRegistry::new())
        .await
        .expect("connect");
    let mut expects_error = case("e", "fail", json!({}), Vec::new());
    expects_error.expected_outcome.status = ResponseStatus::Error;
    let cases = vec![case("s", "fail", json!({}), Vec::new()), expects_error];

    let results = run_test_cases(&mut connection, &cases, &ResponseValidator::default(), Duration::from_secs(1)).await;

    assert!(!results[0].passed);
    assert_eq!(results[0].validation_errors.len(), 1);
    assert!(results[0].response.is_some());
    assert!(results[1].passed);
}

#[tokio::test]
async fn campaign_generates_per_tool_in_discovery_order() {
    let (factory, log) = MockConnection::factory(servers(vec![(
        "srv",
        ScriptedServer::with_tools(vec![open_tool("alpha"), open_tool("beta")]),
    )]));
    let mut replies = Vec::new();
    for label in ["a1", "a2", "b1", "b2"] {
        replies.extend(unit_replies(
            label,
            json!({ "label": label }),
            json!([{ "type": "matches", "target": "label", "value": label }]),
        ));
    }
    let orchestrator = Orchestrator::new(
        factory,
        TestGenerator::new(ScriptedModel::new(replies)),
        ResponseValidator::default(),
        config().with_tests_per_tool(2),
    );

    let report = orchestrator.run_campaign("srv").await;

    assert_eq!(report.outcome, CampaignOutcome::Completed);
    assert_eq!(report.tools_discovered, 2);
    assert_eq!(report.cases_generated, 4);
    let order: Vec<_> = report
        .results
        .iter()
        .map(|result| (result.test_case.tool_name.as_str(), result.test_case.inputs["label"].clone()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("alpha", json!("a1")),
            ("alpha", json!("a2")),
            ("beta", json!("b1")),
            ("beta", json!("b2")),
        ]
    );
    assert!(report.results.iter().all(|result| result.passed));
    let log = log.lock().expect("log");
    assert_eq!(log.list_calls, 1);
    assert_eq!(log.disconnects, 1);
}

#[tokio::test]
async fn generation_shortfall_yields_fewer_results() {
    let (factory, _log) = MockConnection::factory(servers(vec![(
        "srv",
        ScriptedServer::with_tools(vec![open_tool("alpha")]),
    )]));
    let mut replies = unit_replies("ok", json!({}), json!([])).to_vec();
    replies.push("context".to_string());
    replies.push("no json here".to_string());
    let orchestrator = Orchestrator::new(
        factory,
        TestGenerator::new(ScriptedModel::new(replies)),
        ResponseValidator::default(),
        config().with_tests_per_tool(2),
    );

    let report = orchestrator.run_campaign("srv").await;

    assert_eq!(report.cases_generated, 1);
    assert_eq!(report.results.len(), 1);
}

#[tokio::test]
async fn empty_tool_list_is_not_an_error() {
    let (factory, log) = MockConnection::factory(servers(vec![(
        "empty",
        ScriptedServer::with_tools(Vec::new()),
    )]));
    let orchestrator = Orchestrator::new(
        factory,
        TestGenerator::new(ScriptedModel::default()),
        ResponseValidator::default(),
        config(),
    );

    let run = orchestrator.run(&names(&["empty"])).await.expect("run");

    assert_eq!(run.servers.len(), 1);
    assert_eq!(run.servers[0].outcome, CampaignOutcome::NoTools);
    assert!(run.servers[0].results.is_empty());
    assert!(run.all_passed());
    assert!(orchestrator.generator().model().prompts().is_empty());
    assert_eq!(log.lock().expect("log").disconnects, 1);
}

#[tokio::test]
async fn discovery_failure_still_disconnects_once() {
    let mut broken = ScriptedServer::with_tools(Vec::new());
    broken.tools = Err(ConnectionError::Transport("list exploded".to_string()));
    let (factory, log) = MockConnection::factory(servers(vec![("broken", broken)]));
    let orchestrator = Orchestrator::new(
        factory,
        TestGenerator::new(ScriptedModel::default()),
        ResponseValidator::default(),
        config(),
    );

    let report = orchestrator.run_campaign("broken").await;

    assert_eq!(
        report.outcome,
        CampaignOutcome::DiscoveryFailed {
            reason: "transport error: list exploded".to_string()
        }
    );
    assert_eq!(log.lock().expect("log").disconnects, 1);
}

#[tokio::test]
async fn panic_during_discovery_disconnects_before_propagating() {
    let mut exploding = ScriptedServer::with_tools(Vec::new());
    exploding.list_panics = true;
    let (factory, log) = MockConnection::factory(servers(vec![("boom", exploding)]));
    let orchestrator = Orchestrator::new(
        factory,
        TestGenerator::new(ScriptedModel::default()),
        ResponseValidator::default(),
        config(),
    );

    let outcome = AssertUnwindSafe(orchestrator.run_campaign("boom"))
        .catch_unwind()
        .await;

    assert!(outcome.is_err());
    assert_eq!(log.lock().expect("log").disconnects, 1);
}

#[tokio::test]
async fn connection_failure_skips_only_that_server() {
    let mut refusing = ScriptedServer::with_tools(vec![open_tool("never")]);
    refusing.connect = Err(ConnectionError::Spawn("no such file".to_string()));
    let (factory, log) = MockConnection::factory(servers(vec![
        ("down", refusing),
        ("up", ScriptedServer::with_tools(vec![open_tool("echo")])),
    ]));
    let orchestrator = Orchestrator::new(
        factory,
        TestGenerator::new(ScriptedModel::new(unit_replies("hi", json!({}), json!([])))),
        ResponseValidator::default(),
        config(),
    );

    let run = orchestrator.run(&names(&["down", "up"])).await.expect("run");

    assert!(matches!(
        run.servers[0].outcome,
        CampaignOutcome::ConnectionFailed { .. }
    ));
    assert_eq!(run.servers[1].outcome, CampaignOutcome::Completed);
    assert_eq!(run.servers[1].results.len(), 1);
    assert!(!run.all_passed());
    let log = log.lock().expect("log");
    assert_eq!(log.connects, names(&["down", "up"]));
    assert_eq!(log.disconnects, 2);
}

#[tokio::test]
async fn connect_timeout_is_a_connection_failure() {
    let mut hanging = ScriptedServer::with_tools(vec![open_tool("echo")]);
    hanging.connect_hangs = true;
    let (factory, log) = MockConnection::factory(servers(vec![("stuck", hanging)]));
    let orchestrator = Orchestrator::new(
        factory,
        TestGenerator::new(ScriptedModel::default()),
        ResponseValidator::default(),
        config().with_connect_timeout(Duration::from_millis(20)),
    );

    let report = orchestrator.run_campaign("stuck").await;

    assert_eq!(
        report.outcome,
        CampaignOutcome::ConnectionFailed {
            reason: "connection timed out after 20ms".to_string()
        }
    );
    let log = log.lock().expect("log");
    assert_eq!(log.list_calls, 0);
    assert_eq!(log.disconnects, 1);
}

#[tokio::test]
async fn tool_filter_limits_tested_tools() {
    let (factory, log) = MockConnection::factory(servers(vec![(
        "srv",
        ScriptedServer::with_tools(vec![open_tool("keep"), open_tool("skip")]),
    )]));
    let orchestrator = Orchestrator::new(
        factory,
        TestGenerator::new(ScriptedModel::new(unit_replies("k", json!({}), json!([])))),
        ResponseValidator::default(),
        config().with_tool_filter(Arc::new(|name: &str| name != "skip")),
    );

    let report = orchestrator.run_campaign("srv").await;

    assert_eq!(report.tools_discovered, 2);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].test_case.tool_name, "keep");
    assert!(log
        .lock()
        .expect("log")
        .invocations
        .iter()
        .all(|(tool, _)| tool == "keep"));
}

#[tokio::test]
async fn run_rejects_empty_server_list() {
    let (factory, _log) = MockConnection::factory(BTreeMap::new());
    let orchestrator = Orchestrator::new(
        factory,
        TestGenerator::new(ScriptedModel::default()),
        ResponseValidator::default(),
        config(),
    );
    let error = orchestrator.run(&[]).await.expect_err("no servers");
    assert_eq!(error, RunError::NoServers);
    assert_eq!(error.to_string(), "no servers selected to test");
}

#[tokio::test]
async fn sink_sees_each_server_in_order() {
    let (factory, _log) = MockConnection::factory(servers(vec![
        ("a", ScriptedServer::with_tools(Vec::new())),
        ("b", ScriptedServer::with_tools(vec![open_tool("echo")])),
    ]));
    let sink = Arc::new(CollectingSink::default());
    let orchestrator = Orchestrator::new(
        factory,
        TestGenerator::new(ScriptedModel::new(unit_replies("x", json!({}), json!([])))),
        ResponseValidator::default(),
        config(),
    )
    .with_sink(sink.clone());

    let run = orchestrator.run(&names(&["a", "b"])).await.expect("run");

    assert_eq!(
        *sink.seen.lock().expect("seen"),
        vec![("a".to_string(), 0), ("b".to_string(), 1)]
    );
    let summary = run.summary();
    assert_eq!(
        summary,
        RunSummary {
            servers: 2,
            total: 1,
            passed: 1,
            failed: 0
        }
    );
    assert!(run.duration_ms() >= 0);
}

#[test]
fn campaign_config_clamps_and_filters() {
    let config = CampaignConfig::new().with_tests_per_tool(0);
    assert_eq!(config.tests_per_tool, 1);
    assert!(config.allows_tool("anything"));
    let config = config.with_tool_filter(Arc::new(|name: &str| name.starts_with("fs_")));
    assert!(config.allows_tool("fs_read"));
    assert!(!config.allows_tool("net_get"));
    assert!(format!("{config:?}").contains("tool_filter: true"));
}
