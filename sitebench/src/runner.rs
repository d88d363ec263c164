//! Test lifecycle: the hooks a load test exposes and the runner that drives them.
//!
//! A run goes `options -> setup -> iterations -> teardown -> summary ->
//! thresholds`. Setup errors end the run before any virtual user starts.

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Value, json};

use crate::{
    checks::Checks,
    client::{Metered, RequestClient, ReqwestTransport},
    config::Config,
    error::{Error, Result},
    executor::Executor,
    metric::{ERRORS, Registry},
    report::{self, Artifacts, FileReporter, Reporter, StdoutReporter},
    scenario::TestOptions,
    threshold::ThresholdOutcome,
};

/// A load test as seen by the runtime.
///
/// `iteration` is the entry point, invoked once per iteration per virtual
/// user. `Data` is whatever `setup` hands to every iteration and to
/// `teardown`.
#[async_trait]
pub trait LoadTest: Send + Sync + 'static {
    type Data: Send + Sync + 'static;

    fn options(&self) -> TestOptions;

    async fn setup(&self) -> Result<Self::Data>;

    async fn iteration(&self, data: &Self::Data);

    async fn teardown(&self, _data: &Self::Data) {}

    /// Turns the raw metrics object into named artifacts.
    fn handle_summary(&self, raw: &Value) -> Result<Artifacts> {
        report::handle_summary(raw)
    }
}

/// Readiness probe: `GET /` must answer 200.
pub async fn probe_target(client: &RequestClient) -> Result<()> {
    let response = client.get("/", None).await;
    if response.status == 200 {
        tracing::info!("Target {} is reachable", client.base_url());
        return Ok(());
    }
    let reason = response
        .error
        .unwrap_or_else(|| format!("status {}", response.status));
    Err(Error::TargetUnreachable {
        url: response.url,
        reason,
    })
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub iterations: u64,
    pub duration: Duration,
    pub raw: Value,
    pub artifacts: Artifacts,
    pub thresholds: Vec<ThresholdOutcome>,
}

impl RunOutcome {
    /// True when no threshold was crossed.
    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    pub fn violations(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.thresholds.iter().filter(|t| !t.passed)
    }
}

/// Drives a [`LoadTest`] through an [`Executor`].
///
/// The runner owns the run's metric registry and check aggregator; clients
/// built with [`Runner::http_client`] report into both.
pub struct Runner<E: Executor> {
    executor: E,
    registry: Arc<Registry>,
    checks: Checks,
    reporters: Vec<Box<dyn Reporter>>,
}

impl<E: Executor> Runner<E> {
    /// Runner that prints the console artifact and writes nothing to disk.
    pub fn new(executor: E) -> Result<Self> {
        let registry = Arc::new(Registry::new());
        let checks = Checks::new(registry.rate(ERRORS)?);
        Ok(Self {
            executor,
            registry,
            checks,
            reporters: vec![Box::new(StdoutReporter)],
        })
    }

    /// Also write file artifacts under `out_dir`.
    pub fn with_out_dir(self, out_dir: impl Into<PathBuf>) -> Self {
        self.with_reporter(FileReporter::new(out_dir))
    }

    pub fn with_reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    /// Drops every reporter, including the console one.
    pub fn quiet(mut self) -> Self {
        self.reporters.clear();
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn checks(&self) -> &Checks {
        &self.checks
    }

    /// Request client for `config.base_url` that records into this run.
    pub fn http_client(&self, config: &Config) -> Result<RequestClient> {
        let transport = Metered::new(ReqwestTransport::new()?, &self.registry)?;
        Ok(
            RequestClient::new(&config.base_url, Arc::new(transport), self.checks.clone())
                .with_defaults(config.http.request_options()),
        )
    }

    pub async fn run<T: LoadTest>(&self, test: Arc<T>) -> Result<RunOutcome> {
        let options = test.options();
        options.validate()?;

        let start = Instant::now();
        tracing::info!("Starting run with {} scenarios", options.scenarios.len());
        let data = Arc::new(test.setup().await?);

        let action = {
            let test = test.clone();
            let data = data.clone();
            move || {
                let test = test.clone();
                let data = data.clone();
                async move { test.iteration(&data).await }
            }
        };
        let runs = options
            .scenarios
            .iter()
            .map(|scenario| self.executor.exec(scenario, action.clone()));
        let mut iterations = 0;
        for done in join_all(runs).await {
            iterations += done?;
        }

        test.teardown(&data).await;
        let duration = start.elapsed();

        let percentiles = options.thresholds.percentiles();
        let raw = json!({
            "metrics": self.registry.snapshot(duration, &percentiles),
            "checks": self.checks.to_json(),
            "state": { "testRunDurationMs": duration.as_secs_f64() * 1000.0 },
        });

        let artifacts = test.handle_summary(&raw)?;
        for reporter in &self.reporters {
            reporter.report(&artifacts).await?;
        }

        let thresholds = options.thresholds.evaluate(&raw["metrics"]);
        for t in thresholds.iter().filter(|t| !t.passed) {
            tracing::error!(
                "Threshold {} on {} crossed (observed {:?})",
                t.threshold,
                t.selector,
                t.observed
            );
        }

        tracing::info!("Run finished: {iterations} iterations in {duration:?}");
        Ok(RunOutcome {
            iterations,
            duration,
            raw,
            artifacts,
            thresholds,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::{
        client::{Response, tests::Recorder},
        executor::VuExecutor,
        scenario::{LoadProfile, Scenario},
        threshold::ThresholdSet,
    };

    struct Counting {
        setups: AtomicU64,
        iterations: AtomicU64,
        teardowns: AtomicU64,
        fail_setup: bool,
        thresholds: ThresholdSet,
    }

    impl Counting {
        fn new(fail_setup: bool, thresholds: ThresholdSet) -> Arc<Self> {
            Arc::new(Self {
                setups: AtomicU64::new(0),
                iterations: AtomicU64::new(0),
                teardowns: AtomicU64::new(0),
                fail_setup,
                thresholds,
            })
        }
    }

    #[async_trait]
    impl LoadTest for Counting {
        type Data = u64;

        fn options(&self) -> TestOptions {
            TestOptions::builder()
                .scenarios(vec![
                    Scenario::builder()
                        .name("quick")
                        .profile(LoadProfile::constant(2, Duration::from_millis(50)))
                        .build(),
                ])
                .thresholds(self.thresholds.clone())
                .build()
        }

        async fn setup(&self) -> Result<u64> {
            self.setups.fetch_add(1, Ordering::Relaxed);
            if self.fail_setup {
                return Err(Error::TargetUnreachable {
                    url: "http://nowhere".into(),
                    reason: "refused".into(),
                });
            }
            Ok(7)
        }

        async fn iteration(&self, data: &u64) {
            assert_eq!(*data, 7);
            self.iterations.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        async fn teardown(&self, _data: &u64) {
            self.teardowns.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[tokio::test]
    async fn runs_every_hook_once() {
        let runner = Runner::new(VuExecutor::default()).unwrap().quiet();
        let test = Counting::new(false, ThresholdSet::new());
        let outcome = runner.run(test.clone()).await.unwrap();

        assert_eq!(test.setups.load(Ordering::Relaxed), 1);
        assert_eq!(test.teardowns.load(Ordering::Relaxed), 1);
        assert_eq!(outcome.iterations, test.iterations.load(Ordering::Relaxed));
        assert!(outcome.iterations > 0);
        assert!(outcome.passed());
        assert!(outcome.artifacts.stdout().is_some());
        assert!(outcome.raw["state"]["testRunDurationMs"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn failed_setup_stops_the_run() {
        let runner = Runner::new(VuExecutor::default()).unwrap().quiet();
        let test = Counting::new(true, ThresholdSet::new());
        let err = runner.run(test.clone()).await.unwrap_err();

        assert!(matches!(err, Error::TargetUnreachable { .. }));
        assert_eq!(test.iterations.load(Ordering::Relaxed), 0);
        assert_eq!(test.teardowns.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn crossed_threshold_fails_the_outcome() {
        let runner = Runner::new(VuExecutor::default()).unwrap().quiet();
        runner.checks().record("always fails", false);
        let thresholds = ThresholdSet::parse([("errors", ["rate<0.5"])]).unwrap();
        let outcome = runner.run(Counting::new(false, thresholds)).await.unwrap();

        assert!(!outcome.passed());
        assert_eq!(outcome.violations().count(), 1);
    }

    #[tokio::test]
    async fn probe_accepts_only_200() {
        let checks = Checks::default();
        let up = Recorder {
            reply: Response::new("", 200),
            ..Default::default()
        };
        let client = RequestClient::new("http://site.test", Arc::new(up), checks.clone());
        probe_target(&client).await.unwrap();

        let down = Recorder {
            reply: Response::new("", 503),
            ..Default::default()
        };
        let client = RequestClient::new("http://site.test", Arc::new(down), checks);
        let err = probe_target(&client).await.unwrap_err();
        assert!(err.to_string().contains("status 503"), "{err}");
    }
}
