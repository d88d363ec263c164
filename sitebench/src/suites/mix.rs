use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use async_trait::async_trait;

use super::ThinkTime;
use crate::{
    client::{RequestClient, RequestOptions},
    error::Result,
    metric::{Counter, Registry, Trend},
    report::CUSTOM_REQUESTS,
    routes::Route,
    runner::{LoadTest, probe_target},
    scenario::{LoadProfile, Scenario, Stage, TestOptions},
    threshold::ThresholdSet,
    traffic::WeightedSet,
};

pub const CUSTOM_RESPONSE_TIME: &str = "custom_response_time";

const USER_AGENT: &str = "sitebench-mix";

/// Realistic traffic: three overlapping scenarios drawing endpoints from a
/// weighted mix, with custom metrics and a readiness probe.
#[derive(Debug, Clone)]
pub struct MixTest {
    client: RequestClient,
    endpoints: WeightedSet<Route>,
    requests: Counter,
    response_time: Trend,
    scenarios: Vec<Scenario>,
    thresholds: ThresholdSet,
    think: ThinkTime,
}

fn tagged(scenario: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("scenario".to_owned(), scenario.to_owned())])
}

fn default_scenarios() -> Vec<Scenario> {
    let s = Duration::from_secs;
    vec![
        Scenario::builder()
            .name("constant_load")
            .profile(LoadProfile::constant(10, s(120)))
            .tags(tagged("constant"))
            .build(),
        Scenario::builder()
            .name("ramping_load")
            .profile(LoadProfile::ramping(vec![
                Stage::new(s(60), 20),
                Stage::new(s(120), 20),
                Stage::new(s(60), 0),
            ]))
            .start_time(s(120))
            .tags(tagged("ramping"))
            .build(),
        Scenario::builder()
            .name("spike_test")
            .profile(LoadProfile::ramping(vec![
                Stage::new(s(10), 50),
                Stage::new(s(30), 50),
                Stage::new(s(10), 0),
            ]))
            .start_time(s(240))
            .tags(tagged("spike"))
            .build(),
    ]
}

impl MixTest {
    pub fn new(client: RequestClient, registry: &Registry) -> Result<Self> {
        Ok(Self {
            client,
            endpoints: WeightedSet::new(vec![
                (50.0, Route::Home),
                (20.0, Route::Posts),
                (15.0, Route::Categories),
                (10.0, Route::Tags),
                (5.0, Route::About),
            ])?,
            requests: registry.counter(CUSTOM_REQUESTS)?,
            response_time: registry.trend(CUSTOM_RESPONSE_TIME)?,
            scenarios: default_scenarios(),
            thresholds: Self::thresholds()?,
            think: ThinkTime::between(Duration::from_secs(1), Duration::from_secs(4)),
        })
    }

    pub fn with_scenarios(mut self, scenarios: Vec<Scenario>) -> Self {
        self.scenarios = scenarios;
        self
    }

    pub fn with_think_time(mut self, think: ThinkTime) -> Self {
        self.think = think;
        self
    }

    pub fn thresholds() -> Result<ThresholdSet> {
        ThresholdSet::parse([
            ("http_req_duration", vec!["p(95)<500", "p(99)<1000"]),
            ("http_req_failed", vec!["rate<0.01"]),
            ("http_req_duration{scenario:constant}", vec!["p(95)<400"]),
            ("http_req_duration{scenario:ramping}", vec!["p(95)<600"]),
            ("http_req_duration{scenario:spike}", vec!["p(95)<1000"]),
            (CUSTOM_RESPONSE_TIME, vec!["p(95)<500"]),
        ])
    }
}

#[async_trait]
impl LoadTest for MixTest {
    /// When the run started.
    type Data = Instant;

    fn options(&self) -> TestOptions {
        TestOptions::builder()
            .scenarios(self.scenarios.clone())
            .thresholds(self.thresholds.clone())
            .build()
    }

    async fn setup(&self) -> Result<Instant> {
        tracing::info!("Starting mixed traffic test");
        probe_target(&self.client).await?;
        Ok(Instant::now())
    }

    async fn iteration(&self, _: &Instant) {
        let endpoint = *self.endpoints.choose();
        let response = self
            .client
            .get(
                endpoint.path(),
                Some(RequestOptions::new().header("User-Agent", USER_AGENT)),
            )
            .await;

        self.requests.add(1);
        self.response_time.add(response.duration);

        let html = response
            .content_type()
            .is_some_and(|ct| ct.contains("text/html"));
        let passed = self.client.checks().check([
            ("status is 200", response.status == 200),
            ("response has body", response.has_body()),
            ("response time < 1000ms", response.duration < Duration::from_millis(1000)),
            ("response time < 500ms", response.duration < Duration::from_millis(500)),
            ("content type is HTML", html),
        ]);
        if !passed {
            tracing::error!("Request to {} failed checks", endpoint.path());
        }

        self.think.pause().await;
    }

    async fn teardown(&self, started: &Instant) {
        tracing::info!(
            "Test completed in {:.2} seconds",
            started.elapsed().as_secs_f64()
        );
    }
}
