use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::future::join_all;
use tokio::{sync::watch, task::JoinHandle, time::timeout};
use typed_builder::TypedBuilder;

use super::Executor;
use crate::{
    error::Result,
    metric::{self, Tags},
    scenario::{Scenario, Stage},
};
use internals::*;

/// Executor that holds each stage's VU count for the stage's duration.
///
/// A scenario's own `graceful_stop` wins over the executor default.
#[derive(Debug, Clone, TypedBuilder)]
pub struct VuExecutor {
    /// Upper bound on the graceful stop of any scenario.
    #[builder(default = std::time::Duration::from_secs(60))]
    pub max_graceful_stop: std::time::Duration,
}

impl Default for VuExecutor {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Executor for VuExecutor {
    async fn exec<F, Fut>(&self, scenario: &Scenario, action: F) -> Result<u64>
    where
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !scenario.start_time.is_zero() {
            tracing::info!(
                "Scenario {} waiting {:?} before starting",
                scenario.name,
                scenario.start_time
            );
            tokio::time::sleep(scenario.start_time).await;
        }

        let graceful_stop = scenario.graceful_stop.min(self.max_graceful_stop);
        let tags: Tags = Arc::new(scenario.tags.clone());
        let iterations = Arc::new(AtomicU64::new(0));
        let stages = scenario.profile.stages();
        let j = stages.len();

        for (i, stage) in stages.into_iter().enumerate() {
            tracing::info!(
                "Scenario {}: stage {}/{j}, {} VUs for {:?}",
                scenario.name,
                i + 1,
                stage.target,
                stage.duration
            );
            run_stage(
                stage,
                graceful_stop,
                tags.clone(),
                action.clone(),
                iterations.clone(),
            )
            .await;
        }

        let done = iterations.load(Ordering::Relaxed);
        tracing::info!(
            "Done running scenario: {} ({done} iterations)",
            scenario.name
        );
        Ok(done)
    }
}

/// Internal components of the `VuExecutor`.
mod internals {
    use super::*;

    /// Runs one stage to completion, including its graceful stop.
    pub async fn run_stage<F, Fut>(
        stage: Stage,
        graceful_stop: std::time::Duration,
        tags: Tags,
        action: F,
        iterations: Arc<AtomicU64>,
    ) where
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handles = spawn_vus(stop_rx, stage.target, tags, action, iterations);
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

        tokio::time::sleep(stage.duration).await;
        stop_tx.send_replace(true);

        match timeout(graceful_stop, join_all(handles)).await {
            Ok(results) => {
                for res in results {
                    if let Err(e) = res {
                        tracing::error!("VU panicked with error: {e}");
                    }
                }
            }
            Err(_) => {
                tracing::warn!(
                    "Graceful stop of {graceful_stop:?} exceeded, interrupting {} VUs",
                    aborts.iter().filter(|a| !a.is_finished()).count()
                );
                aborts.iter().for_each(|a| a.abort());
            }
        }
    }

    /// Spawns `vus` tasks that run `action` until `stop` turns true. Samples
    /// recorded by the tasks carry `tags`.
    pub fn spawn_vus<F, Fut>(
        stop: watch::Receiver<bool>,
        vus: u32,
        tags: Tags,
        action: F,
        iterations: Arc<AtomicU64>,
    ) -> Vec<JoinHandle<()>>
    where
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        (0..vus)
            .map(|vu| {
                let stop = stop.clone();
                let action = action.clone();
                let iterations = iterations.clone();
                tokio::spawn(metric::with_tags(tags.clone(), async move {
                    tracing::debug!("VU {vu} started.");
                    while !*stop.borrow() {
                        action().await;
                        iterations.fetch_add(1, Ordering::Relaxed);
                        // an iteration that never awaits must not starve the stage timer
                        tokio::task::yield_now().await;
                    }
                    tracing::debug!("VU {vu} stopped.");
                }))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::scenario::LoadProfile;

    fn scenario(profile: LoadProfile) -> Scenario {
        Scenario::builder()
            .name("test")
            .profile(profile)
            .graceful_stop(Duration::from_millis(200))
            .build()
    }

    #[tokio::test]
    async fn spawn_expected_number_of_vus() {
        let (tx, rx) = watch::channel(false);
        let counter = Arc::new(AtomicU64::new(0));
        let action = || async { tokio::time::sleep(Duration::from_millis(1)).await };
        let vus = spawn_vus(rx, 10, Tags::default(), action, counter.clone());
        assert_eq!(vus.len(), 10);

        tx.send_replace(true);
        join_all(vus).await;
    }

    #[tokio::test]
    async fn constant_profile_runs_iterations() {
        let executor = VuExecutor::default();
        let hits = Arc::new(AtomicU64::new(0));
        let action = {
            let hits = hits.clone();
            move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        };

        let done = executor
            .exec(
                &scenario(LoadProfile::constant(2, Duration::from_millis(100))),
                action,
            )
            .await
            .unwrap();

        assert!(done >= 2, "only {done} iterations");
        // every started iteration finished within the graceful stop
        assert_eq!(done, hits.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn zero_vu_stage_only_waits() {
        let executor = VuExecutor::default();
        let profile = LoadProfile::ramping(vec![Stage::new(Duration::from_millis(20), 0)]);
        let done = executor
            .exec(&scenario(profile), || async {})
            .await
            .unwrap();
        assert_eq!(done, 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn busy_iterations_still_stop() {
        let executor = VuExecutor::default();
        let sc = scenario(LoadProfile::constant(2, Duration::from_millis(20)));
        let run = executor.exec(&sc, || async {});
        let done = timeout(Duration::from_secs(5), run)
            .await
            .expect("stage never ended")
            .unwrap();
        assert!(done > 0);
    }

    #[tokio::test]
    async fn iterations_see_scenario_tags() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let action = {
            let seen = seen.clone();
            move || {
                let seen = seen.clone();
                async move {
                    seen.lock().push(metric::current_tags());
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }
        };
        let mut tagged = scenario(LoadProfile::constant(1, Duration::from_millis(20)));
        tagged.tags.insert("scenario".into(), "constant".into());
        VuExecutor::default().exec(&tagged, action).await.unwrap();

        let seen = seen.lock();
        assert!(!seen.is_empty());
        for tags in seen.iter() {
            assert_eq!(tags.as_ref().unwrap()["scenario"], "constant");
        }
    }

    #[tokio::test]
    async fn stuck_iterations_are_interrupted() {
        let executor = VuExecutor::builder()
            .max_graceful_stop(Duration::from_millis(20))
            .build();
        let started = std::time::Instant::now();
        let done = executor
            .exec(
                &scenario(LoadProfile::constant(1, Duration::from_millis(10))),
                || async { tokio::time::sleep(Duration::from_secs(30)).await },
            )
            .await
            .unwrap();
        assert_eq!(done, 0);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
