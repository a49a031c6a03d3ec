use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::TestResult;

/// How a server's campaign ended.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CampaignOutcome {
    /// Every generated case was executed.
    Completed,
    /// The server listed no tools to test.
    NoTools,
    /// The server could not be reached.
    ConnectionFailed { reason: String },
    /// The server was reached but tool discovery failed.
    DiscoveryFailed { reason: String },
}

impl CampaignOutcome {
    /// Whether the campaign hit a connection-level failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CampaignOutcome::ConnectionFailed { .. } | CampaignOutcome::DiscoveryFailed { .. }
        )
    }
}

/// Results of one server's campaign.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerReport {
    /// The address or registry name the campaign targeted.
    pub server: String,
    pub outcome: CampaignOutcome,
    pub tools_discovered: usize,
    pub cases_generated: usize,
    /// One entry per generated case, in generation order.
    pub results: Vec<TestResult>,
}

impl ServerReport {
    pub(crate) fn empty(server: &str, outcome: CampaignOutcome) -> Self {
        Self {
            server: server.to_string(),
            outcome,
            tools_discovered: 0,
            cases_generated: 0,
            results: Vec::new(),
        }
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|result| result.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }
}

/// Aggregate counts across a run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RunSummary {
    pub servers: usize,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

/// Everything a run produced, in server order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub servers: Vec<ServerReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        self.servers
            .iter()
            .fold(RunSummary::default(), |mut summary, server| {
                summary.servers += 1;
                summary.total += server.results.len();
                summary.passed += server.passed();
                summary.failed += server.failed();
                summary
            })
    }

    /// True when no case failed and no campaign hit a connection-level failure.
    pub fn all_passed(&self) -> bool {
        self.servers
            .iter()
            .all(|server| server.failed() == 0 && !server.outcome.is_failure())
    }

    /// Elapsed wall-clock time of the run in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
