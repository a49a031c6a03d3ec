use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;

use crate::{
    Connection, ConnectionError, LanguageModel, ResponseValidator, ServerRegistry, TestGenerator,
};

use super::execution::run_test_cases;
use super::report::{CampaignOutcome, RunReport, ServerReport};
use super::{CampaignConfig, ReportSink, RunError};

/// Drives connect, discover, generate, execute, and disconnect for each
/// server, one server at a time.
///
/// `factory` yields a fresh [`Connection`] per campaign. Every connection it
/// yields is disconnected exactly once, whatever happens in between.
pub struct Orchestrator<C, F, M> {
    factory: F,
    generator: TestGenerator<M>,
    validator: ResponseValidator,
    config: CampaignConfig,
    registry: Arc<ServerRegistry>,
    sink: Option<Arc<dyn ReportSink>>,
    _connection: PhantomData<fn() -> C>,
}

impl<C, F, M> Orchestrator<C, F, M>
where
    C: Connection,
    F: Fn() -> C,
    M: LanguageModel,
{
    pub fn new(
        factory: F,
        generator: TestGenerator<M>,
        validator: ResponseValidator,
        config: CampaignConfig,
    ) -> Self {
        Self {
            factory,
            generator,
            validator,
            config,
            registry: Arc::new(ServerRegistry::new()),
            sink: None,
            _connection: PhantomData,
        }
    }

    /// Named servers that addresses may refer to.
    pub fn with_registry(mut self, registry: Arc<ServerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Receives each server's report as soon as its campaign ends.
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    pub fn generator(&self) -> &TestGenerator<M> {
        &self.generator
    }

    /// Runs a campaign per server, in order.
    ///
    /// Only an empty server list is fatal; per-server failures are recorded
    /// in that server's report.
    pub async fn run(&self, servers: &[String]) -> Result<RunReport, RunError> {
        if servers.is_empty() {
            return Err(RunError::NoServers);
        }
        let started_at = Utc::now();
        let mut reports = Vec::with_capacity(servers.len());
        for server in servers {
            let report = self.run_campaign(server).await;
            if let Some(sink) = &self.sink {
                sink.record(&report);
            }
            reports.push(report);
        }
        Ok(RunReport {
            servers: reports,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Runs one server's campaign on a fresh connection.
    ///
    /// The connection is released before this returns. A panic escaping the
    /// campaign is resumed after the disconnect.
    pub async fn run_campaign(&self, server: &str) -> ServerReport {
        let mut connection = (self.factory)();
        let outcome = AssertUnwindSafe(self.drive(server, &mut connection))
            .catch_unwind()
            .await;
        connection.disconnect().await;
        log::debug!("campaign '{server}': disconnected");
        match outcome {
            Ok(report) => report,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    async fn drive(&self, server: &str, connection: &mut C) -> ServerReport {
        log::info!("campaign '{server}': connecting");
        let connect = tokio::time::timeout(
            self.config.connect_timeout,
            connection.connect(server, &self.registry),
        )
        .await
        .unwrap_or(Err(ConnectionError::Timeout(self.config.connect_timeout)));
        if let Err(error) = connect {
            log::warn!("campaign '{server}': connection failed: {error}");
            return ServerReport::empty(
                server,
                CampaignOutcome::ConnectionFailed {
                    reason: error.to_string(),
                },
            );
        }

        let tools = match connection.list_tools().await {
            Ok(tools) => tools,
            Err(error) => {
                log::warn!("campaign '{server}': tool discovery failed: {error}");
                return ServerReport::empty(
                    server,
                    CampaignOutcome::DiscoveryFailed {
                        reason: error.to_string(),
                    },
                );
            }
        };
        let tools_discovered = tools.len();
        let tools: Vec<_> = tools
            .into_iter()
            .filter(|tool| self.config.allows_tool(&tool.name))
            .collect();
        log::info!(
            "campaign '{server}': discovered {tools_discovered} tools, testing {}",
            tools.len()
        );
        if tools.is_empty() {
            log::info!("campaign '{server}': no tools to test");
            let mut report = ServerReport::empty(server, CampaignOutcome::NoTools);
            report.tools_discovered = tools_discovered;
            return report;
        }

        let mut cases = Vec::new();
        for tool in &tools {
            let generated = self
                .generator
                .generate(tool, self.config.tests_per_tool)
                .await;
            if generated.len() < self.config.tests_per_tool {
                log::warn!(
                    "campaign '{server}': tool '{}' produced {} of {} requested tests",
                    tool.name,
                    generated.len(),
                    self.config.tests_per_tool
                );
            }
            cases.extend(generated);
        }

        log::info!("campaign '{server}': executing {} tests", cases.len());
        let results =
            run_test_cases(connection, &cases, &self.validator, self.config.test_timeout).await;
        let passed = results.iter().filter(|result| result.passed).count();
        log::info!(
            "campaign '{server}': {passed}/{} tests passed",
            results.len()
        );
        ServerReport {
            server: server.to_string(),
            outcome: CampaignOutcome::Completed,
            tools_discovered,
            cases_generated: cases.len(),
            results,
        }
    }
}
