//! Command-line driver for toolgrade campaigns.
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

use std::collections::HashSet;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use toolgrade_core::{
    CampaignConfig, Connection, ConnectionError, Orchestrator, ResponseValidator,
    ServerConnection, ServerRegistry, TestGenerator, ToolNamePredicate,
};

pub mod cli;
mod config;
mod output;

pub use cli::{Cli, Command, ConfigCommand, OutputFormat};
pub use config::{
    discover_config, load_config, parse_config, ConfigSource, ModelProvider, ModelSection,
    RunSection, ToolgradeConfig, DEFAULT_CONFIG,
};

use output::{emit, error_exit, exit_code_for_report, render_report, render_tools, ProgressSink};

pub async fn run(cli: Cli) -> ExitCode {
    let json_errors = cli.output_format() == OutputFormat::Json;
    match execute(&cli).await {
        Ok(code) => code,
        Err(message) => error_exit(&message, json_errors),
    }
}

async fn execute(cli: &Cli) -> Result<ExitCode, String> {
    match &cli.command {
        Command::Config {
            command: ConfigCommand::Default,
        } => {
            print!("{DEFAULT_CONFIG}");
            Ok(ExitCode::SUCCESS)
        }
        Command::ListTools { server } => {
            let (config, source) = load_config(cli.config.as_deref())?;
            log::debug!("using configuration from {source}");
            let campaign = campaign_config(&config.run, cli)?;
            let registry = config.registry();
            let tools = list_tools(server, &registry, campaign.connect_timeout).await?;
            emit(
                &render_tools(&tools, cli.output_format())?,
                cli.output.as_deref(),
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { servers, all } => {
            let (config, source) = load_config(cli.config.as_deref())?;
            log::debug!("using configuration from {source}");
            let campaign = campaign_config(&config.run, cli)?;
            let selected = select_servers(servers, *all, &config)?;
            let model = config.model.client(|name| std::env::var(name).ok())?;
            log::info!(
                "testing {} server(s) with {} test(s) per tool",
                selected.len(),
                campaign.tests_per_tool
            );
            let orchestrator = Orchestrator::new(
                ServerConnection::new,
                TestGenerator::new(model),
                ResponseValidator::default(),
                campaign,
            )
            .with_registry(Arc::new(config.registry()))
            .with_sink(Arc::new(ProgressSink));
            let report = orchestrator
                .run(&selected)
                .await
                .map_err(|error| error.to_string())?;
            emit(
                &render_report(&report, cli.output_format())?,
                cli.output.as_deref(),
            )?;
            Ok(exit_code_for_report(&report))
        }
    }
}

/// Merges `[run]` settings with command-line overrides.
pub fn campaign_config(run: &RunSection, cli: &Cli) -> Result<CampaignConfig, String> {
    let tests_per_tool = cli.tests_per_tool.or(run.tests_per_tool).unwrap_or(3);
    if tests_per_tool == 0 {
        return Err("tests-per-tool must be at least 1".to_string());
    }
    let mut config = CampaignConfig::new().with_tests_per_tool(tests_per_tool);
    if let Some(ms) = cli.timeout_ms.or(run.test_timeout_ms) {
        config = config.with_test_timeout(positive_millis(ms, "timeout-ms")?);
    }
    if let Some(ms) = cli.connect_timeout_ms.or(run.connect_timeout_ms) {
        config = config.with_connect_timeout(positive_millis(ms, "connect-timeout-ms")?);
    }
    let allowlist = prefer_cli(&cli.tool_allowlist, &run.tool_allowlist);
    let blocklist = prefer_cli(&cli.tool_blocklist, &run.tool_blocklist);
    if let Some(filter) = build_tool_filter(allowlist, blocklist) {
        config = config.with_tool_filter(filter);
    }
    Ok(config)
}

fn prefer_cli<'a>(cli: &'a [String], file: &'a [String]) -> &'a [String] {
    if cli.is_empty() {
        file
    } else {
        cli
    }
}

fn positive_millis(ms: u64, flag: &str) -> Result<Duration, String> {
    if ms == 0 {
        return Err(format!("{flag} must be greater than 0"));
    }
    Ok(Duration::from_millis(ms))
}

/// Tools pass when allowlisted (or no allowlist is set) and not blocklisted.
pub fn build_tool_filter(allowlist: &[String], blocklist: &[String]) -> Option<ToolNamePredicate> {
    if allowlist.is_empty() && blocklist.is_empty() {
        return None;
    }
    let allowlist =
        (!allowlist.is_empty()).then(|| allowlist.iter().cloned().collect::<HashSet<_>>());
    let blocklist = blocklist.iter().cloned().collect::<HashSet<_>>();
    let predicate: ToolNamePredicate = Arc::new(move |tool_name| {
        allowlist
            .as_ref()
            .is_none_or(|allowlist| allowlist.contains(tool_name))
            && !blocklist.contains(tool_name)
    });
    Some(predicate)
}

/// Servers named on the command line, every registry entry with `--all`, or
/// the configured default selection.
pub fn select_servers(
    requested: &[String],
    all: bool,
    config: &ToolgradeConfig,
) -> Result<Vec<String>, String> {
    let selected: Vec<String> = if all {
        config.servers.keys().cloned().collect()
    } else if !requested.is_empty() {
        requested.to_vec()
    } else {
        config.run.servers.clone()
    };
    if selected.is_empty() {
        return Err(
            "no servers selected to test; name servers, pass --all, or set run.servers"
                .to_string(),
        );
    }
    Ok(selected)
}

async fn list_tools(
    server: &str,
    registry: &ServerRegistry,
    connect_timeout: Duration,
) -> Result<Vec<toolgrade_core::ToolDefinition>, String> {
    let mut connection = ServerConnection::new();
    let connected = tokio::time::timeout(connect_timeout, connection.connect(server, registry))
        .await
        .unwrap_or(Err(ConnectionError::Timeout(connect_timeout)));
    let tools = match connected {
        Ok(()) => connection.list_tools().await,
        Err(error) => Err(error),
    };
    connection.disconnect().await;
    tools.map_err(|error| format!("{server}: {error}"))
}
