use std::fs;
use std::path::Path;
use std::process::ExitCode;

use serde::Serialize;
use toolgrade_core::{CampaignOutcome, ReportSink, RunReport, ServerReport, ToolDefinition};

use crate::cli::OutputFormat;

#[derive(Serialize)]
struct CliError<'a> {
    status: &'static str,
    message: &'a str,
}

pub(super) fn error_exit(message: &str, json: bool) -> ExitCode {
    if json {
        let payload = CliError {
            status: "error",
            message,
        };
        let output = serde_json::to_string_pretty(&payload).unwrap_or(message.to_string());
        eprintln!("{output}");
    } else {
        eprintln!("error: {message}");
    }
    ExitCode::from(2)
}

pub(super) fn exit_code_for_report(report: &RunReport) -> ExitCode {
    if report.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

/// Writes `text` to `path`, or to stdout when no path is given.
pub(super) fn emit(text: &str, path: Option<&Path>) -> Result<(), String> {
    match path {
        Some(path) => fs::write(path, text)
            .map_err(|error| format!("failed to write report to {}: {error}", path.display())),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}

/// Logs each server's tally as its campaign finishes.
pub(super) struct ProgressSink;

impl ReportSink for ProgressSink {
    fn record(&self, report: &ServerReport) {
        if report.outcome.is_failure() {
            log::warn!("server '{}': {}", report.server, outcome_label(&report.outcome));
        } else {
            log::info!(
                "server '{}': {} passed, {} failed",
                report.server,
                report.passed(),
                report.failed()
            );
        }
    }
}

pub(super) fn render_report(report: &RunReport, format: OutputFormat) -> Result<String, String> {
    match format {
        OutputFormat::Human => Ok(format_report_human(report)),
        OutputFormat::Markdown => Ok(format_report_markdown(report)),
        OutputFormat::Json => to_json(report),
    }
}

pub(super) fn render_tools(tools: &[ToolDefinition], format: OutputFormat) -> Result<String, String> {
    match format {
        OutputFormat::Json => to_json(&tools),
        OutputFormat::Human => {
            let mut output = String::new();
            for tool in tools {
                output.push_str(&tool.name);
                if !tool.description.is_empty() {
                    output.push_str(" - ");
                    output.push_str(tool.description.trim());
                }
                output.push('\n');
                for field in tool.fields() {
                    output.push_str(&format!(
                        "    {}: {}{}\n",
                        field.name,
                        field.kind.as_deref().unwrap_or("any"),
                        if field.required { " (required)" } else { "" }
                    ));
                }
            }
            Ok(output)
        }
        OutputFormat::Markdown => {
            let mut output = String::from("| Tool | Description | Required |\n|---|---|---|\n");
            for tool in tools {
                output.push_str(&format!(
                    "| {} | {} | {} |\n",
                    cell(&tool.name),
                    cell(&tool.description),
                    cell(&tool.required_fields().join(", "))
                ));
            }
            Ok(output)
        }
    }
}

fn to_json(value: &impl Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value)
        .map(|mut text| {
            text.push('\n');
            text
        })
        .map_err(|error| format!("failed to serialize report: {error}"))
}

pub(super) fn outcome_label(outcome: &CampaignOutcome) -> String {
    match outcome {
        CampaignOutcome::Completed => "completed".to_string(),
        CampaignOutcome::NoTools => "no tools to test".to_string(),
        CampaignOutcome::ConnectionFailed { reason } => format!("connection failed: {reason}"),
        CampaignOutcome::DiscoveryFailed { reason } => format!("tool discovery failed: {reason}"),
    }
}

pub(super) fn format_report_human(report: &RunReport) -> String {
    let mut output = String::new();
    for server in &report.servers {
        output.push_str(&format!(
            "Server: {} ({})\n",
            server.server,
            outcome_label(&server.outcome)
        ));
        if server.outcome.is_failure() {
            continue;
        }
        output.push_str(&format!(
            "  Tools: {} discovered, {} tests generated\n",
            server.tools_discovered, server.cases_generated
        ));
        for result in &server.results {
            output.push_str(&format!(
                "  {} {}: {}",
                if result.passed { "PASS" } else { "FAIL" },
                result.test_case.tool_name,
                result.test_case.description
            ));
            if let Some(elapsed) = result.execution_time_ms {
                output.push_str(&format!(" ({elapsed}ms)"));
            }
            output.push('\n');
            for error in &result.validation_errors {
                output.push_str(&format!("    - {error}\n"));
            }
        }
    }
    let summary = report.summary();
    output.push_str(&format!(
        "Summary: {} servers, {} tests, {} passed, {} failed ({}ms)\n",
        summary.servers,
        summary.total,
        summary.passed,
        summary.failed,
        report.duration_ms()
    ));
    output
}

pub(super) fn format_report_markdown(report: &RunReport) -> String {
    let summary = report.summary();
    let mut output = String::from("# toolgrade report\n\n");
    output.push_str(&format!(
        "{} tests across {} servers: {} passed, {} failed.\n\n",
        summary.total, summary.servers, summary.passed, summary.failed
    ));
    output.push_str("| Server | Outcome | Tests | Passed | Failed |\n|---|---|---|---|---|\n");
    for server in &report.servers {
        output.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            cell(&server.server),
            cell(&outcome_label(&server.outcome)),
            server.results.len(),
            server.passed(),
            server.failed()
        ));
    }
    for server in report.servers.iter().filter(|server| !server.results.is_empty()) {
        output.push_str(&format!("\n## {}\n\n", server.server));
        output.push_str("| Result | Tool | Test | Errors |\n|---|---|---|---|\n");
        for result in &server.results {
            output.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                if result.passed { "pass" } else { "fail" },
                cell(&result.test_case.tool_name),
                cell(&result.test_case.description),
                cell(&result.validation_errors.join("; "))
            ));
        }
    }
    output
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}
