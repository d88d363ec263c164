use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    client::RequestClient,
    error::Result,
    report::{Artifacts, STDOUT, SUMMARY_FILE, build_summary},
    routes::Route,
    runner::LoadTest,
    scenario::{Scenario, TestOptions},
    threshold::ThresholdSet,
};

/// Hits every route once per iteration with a tighter latency budget.
#[derive(Debug, Clone)]
pub struct ApiTest {
    client: RequestClient,
    routes: Vec<Route>,
    budget: Duration,
    scenario: Scenario,
    thresholds: ThresholdSet,
    between_routes: Duration,
    between_iterations: Duration,
}

impl ApiTest {
    pub fn new(client: RequestClient, scenario: Scenario, thresholds: ThresholdSet) -> Self {
        Self {
            client,
            routes: Route::ALL.to_vec(),
            budget: Duration::from_millis(500),
            scenario,
            thresholds,
            between_routes: Duration::from_millis(500),
            between_iterations: Duration::from_secs(1),
        }
    }

    /// Pauses after each route and after each full pass.
    pub fn with_pauses(mut self, between_routes: Duration, between_iterations: Duration) -> Self {
        self.between_routes = between_routes;
        self.between_iterations = between_iterations;
        self
    }
}

#[async_trait]
impl LoadTest for ApiTest {
    type Data = ();

    fn options(&self) -> TestOptions {
        TestOptions::builder()
            .scenarios(vec![self.scenario.clone()])
            .thresholds(self.thresholds.clone())
            .build()
    }

    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    async fn iteration(&self, _: &()) {
        for route in &self.routes {
            let response = self.client.get(route.path(), None).await;
            self.client
                .check_response(&response, 200, &format!("API {}", route.label()));
            self.client.assert_latency_under(&response, self.budget);
            tokio::time::sleep(self.between_routes).await;
        }
        tokio::time::sleep(self.between_iterations).await;
    }

    /// Verdict is `PASSED` only when no request failed at all.
    fn handle_summary(&self, raw: &Value) -> Result<Artifacts> {
        let summary = build_summary(raw);
        let status = if summary.failed_rate == 0.0 {
            "PASSED"
        } else {
            "FAILED"
        };
        tracing::info!("API Test {status}");

        let verdict = json!({
            "status": status,
            "metrics": {
                "requests": summary.total_requests,
                "failures": summary.failed_rate,
                "avg_duration": summary.avg_duration,
                "p95_duration": summary.p95_duration,
            }
        });
        Ok(Artifacts::new()
            .with(STDOUT, serde_json::to_string_pretty(&verdict)?)
            .with(SUMMARY_FILE, summary.to_json()?))
    }
}
