use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::ThinkTime;
use crate::{
    client::RequestClient,
    error::Result,
    metric::{HTTP_REQ_DURATION, HTTP_REQ_FAILED, HTTP_REQS},
    page::{AboutPage, HomePage, Page, PostsPage},
    report::{self, Artifacts, STDOUT},
    runner::LoadTest,
    scenario::{Scenario, TestOptions},
    threshold::ThresholdSet,
    traffic::WeightedSet,
};

/// Each iteration loads one of Home, Posts or About, chosen uniformly.
///
/// Used for the `load`, `stress` and `spike` profiles.
pub struct BrowseTest {
    client: RequestClient,
    pages: WeightedSet<Box<dyn Page>>,
    scenario: Scenario,
    thresholds: ThresholdSet,
    think: ThinkTime,
}

impl BrowseTest {
    pub fn new(
        client: RequestClient,
        scenario: Scenario,
        thresholds: ThresholdSet,
    ) -> Result<Self> {
        let pages: Vec<Box<dyn Page>> = vec![
            Box::new(HomePage::new(client.clone())),
            Box::new(PostsPage::new(client.clone())),
            Box::new(AboutPage::new(client.clone())),
        ];
        Ok(Self {
            client,
            pages: WeightedSet::uniform(pages)?,
            scenario,
            thresholds,
            think: ThinkTime::between(Duration::from_secs(1), Duration::from_secs(3)),
        })
    }

    pub fn with_think_time(mut self, think: ThinkTime) -> Self {
        self.think = think;
        self
    }
}

#[async_trait]
impl LoadTest for BrowseTest {
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
        let page = self.pages.choose();
        let response = page.load().await;
        self.client
            .check_response(&response, 200, &format!("{} Page", page.name()));
        self.think.pause().await;
    }

    /// Raw built-in HTTP metrics on the console, plus the JSON summary file.
    fn handle_summary(&self, raw: &Value) -> Result<Artifacts> {
        tracing::info!("{} test finished", self.scenario.name);
        let metric = |name: &str| raw["metrics"].get(name).cloned().unwrap_or(Value::Null);
        let stdout = json!({
            "metrics": {
                HTTP_REQ_DURATION: metric(HTTP_REQ_DURATION),
                HTTP_REQ_FAILED: metric(HTTP_REQ_FAILED),
                HTTP_REQS: metric(HTTP_REQS),
            }
        });
        let mut artifacts = report::handle_summary(raw)?;
        artifacts.insert(STDOUT, serde_json::to_string_pretty(&stdout)?);
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::tests::client;

    #[test]
    fn summary_keeps_only_http_metrics() {
        let test = BrowseTest::new(
            client(),
            Scenario::builder()
                .name("load")
                .profile(crate::scenario::LoadProfile::constant(1, Duration::from_secs(1)))
                .build(),
            ThresholdSet::new(),
        )
        .unwrap();
        let raw = json!({
            "metrics": {
                "http_reqs": { "type": "counter", "values": { "count": 3 } },
                "errors": { "type": "rate", "values": { "rate": 0.0 } },
            }
        });
        let artifacts = test.handle_summary(&raw).unwrap();
        let stdout: Value = serde_json::from_str(artifacts.stdout().unwrap()).unwrap();
        assert_eq!(stdout["metrics"]["http_reqs"]["values"]["count"], 3);
        assert!(stdout["metrics"]["http_req_failed"].is_null());
        assert!(stdout["metrics"].get("errors").is_none());
        assert!(artifacts.get(report::SUMMARY_FILE).is_some());
    }
}
