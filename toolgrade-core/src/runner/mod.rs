//! Campaign orchestration: connection lifecycle, timed execution, grading.

use std::fmt;
use std::time::Duration;

use crate::ToolNamePredicate;

mod campaign;
mod execution;
mod report;

pub use campaign::Orchestrator;
pub use execution::run_test_cases;
pub use report::{CampaignOutcome, RunReport, RunSummary, ServerReport};

#[cfg(test)]
#[path = "../../tests/internal/runner_tests.rs"]
mod tests;

const DEFAULT_TESTS_PER_TOOL: usize = 3;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared by every campaign in a run.
#[derive(Clone)]
pub struct CampaignConfig {
    /// Cases requested per tool; at least 1.
    pub tests_per_tool: usize,
    /// Bound on connection establishment.
    pub connect_timeout: Duration,
    /// Bound on each tool invocation.
    pub test_timeout: Duration,
    /// Decides which discovered tools are tested; all when absent.
    pub tool_filter: Option<ToolNamePredicate>,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            tests_per_tool: DEFAULT_TESTS_PER_TOOL,
            connect_timeout: DEFAULT_TIMEOUT,
            test_timeout: DEFAULT_TIMEOUT,
            tool_filter: None,
        }
    }
}

impl fmt::Debug for CampaignConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CampaignConfig")
            .field("tests_per_tool", &self.tests_per_tool)
            .field("connect_timeout", &self.connect_timeout)
            .field("test_timeout", &self.test_timeout)
            .field("tool_filter", &self.tool_filter.is_some())
            .finish()
    }
}

impl CampaignConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-tool case count, raising 0 to 1.
    pub fn with_tests_per_tool(mut self, tests_per_tool: usize) -> Self {
        self.tests_per_tool = tests_per_tool.max(1);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    pub fn with_tool_filter(mut self, filter: ToolNamePredicate) -> Self {
        self.tool_filter = Some(filter);
        self
    }

    pub fn allows_tool(&self, name: &str) -> bool {
        self.tool_filter.as_ref().is_none_or(|filter| filter(name))
    }
}

/// Receives one report per server, after that server's connection is released.
pub trait ReportSink: Send + Sync {
    fn record(&self, report: &ServerReport);
}

/// Failures that abort a whole run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RunError {
    /// No servers were selected.
    NoServers,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::NoServers => f.write_str("no servers selected to test"),
        }
    }
}

impl std::error::Error for RunError {}
