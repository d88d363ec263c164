//! Ready-made load tests against the site.
//!
//! | suite    | load profile             | per iteration                         |
//! |----------|--------------------------|---------------------------------------|
//! | `smoke`  | `smoke`                  | Home, Posts, About in order           |
//! | `load`   | `load`                   | one page picked uniformly at random   |
//! | `stress` | `stress`                 | same as `load`                        |
//! | `spike`  | `spike`                  | same as `load`                        |
//! | `api`    | `api`                    | every route with a 500ms budget       |
//! | `mix`    | three built-in scenarios | one weighted endpoint, five checks    |

mod api;
mod load;
mod mix;
mod smoke;

pub use api::ApiTest;
pub use load::BrowseTest;
pub use mix::MixTest;
pub use smoke::SmokeTest;

use std::{sync::Arc, time::Duration};

use clap::ValueEnum;

use crate::{
    config::Config,
    error::{Error, Result},
    executor::Executor,
    runner::{RunOutcome, Runner},
    threshold::ThresholdSet,
    traffic,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SuiteKind {
    Smoke,
    Load,
    Stress,
    Spike,
    Api,
    Mix,
}

impl SuiteKind {
    pub const fn name(self) -> &'static str {
        match self {
            SuiteKind::Smoke => "smoke",
            SuiteKind::Load => "load",
            SuiteKind::Stress => "stress",
            SuiteKind::Spike => "spike",
            SuiteKind::Api => "api",
            SuiteKind::Mix => "mix",
        }
    }

    /// Configured threshold profile of the suite. `mix` brings its own
    /// thresholds and has none.
    pub const fn threshold_profile(self) -> Option<&'static str> {
        match self {
            SuiteKind::Mix => None,
            SuiteKind::Spike => Some("default"),
            other => Some(other.name()),
        }
    }

    fn thresholds(self, config: &Config) -> Result<ThresholdSet> {
        let name = self
            .threshold_profile()
            .ok_or_else(|| Error::UnknownThresholdProfile(self.name().to_owned()))?;
        config.thresholds(name)
    }
}

/// Pause between simulated user actions, uniformly random in `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkTime {
    pub min: Duration,
    pub max: Duration,
}

impl ThinkTime {
    pub const NONE: ThinkTime = ThinkTime::fixed(Duration::ZERO);

    pub const fn fixed(pause: Duration) -> Self {
        Self {
            min: pause,
            max: pause,
        }
    }

    pub const fn between(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub async fn pause(self) {
        if !self.max.is_zero() {
            traffic::think(self.min, self.max).await;
        }
    }
}

/// Builds the suite's test from `config` and runs it.
pub async fn run<E: Executor>(
    kind: SuiteKind,
    config: &Config,
    runner: &Runner<E>,
) -> Result<RunOutcome> {
    tracing::info!("Running {} suite against {}", kind.name(), config.base_url);
    let client = runner.http_client(config)?;
    match kind {
        SuiteKind::Smoke => {
            let test = SmokeTest::new(
                client,
                config.scenario(kind.name())?,
                kind.thresholds(config)?,
            );
            runner.run(Arc::new(test)).await
        }
        SuiteKind::Load | SuiteKind::Stress | SuiteKind::Spike => {
            let test = BrowseTest::new(
                client,
                config.scenario(kind.name())?,
                kind.thresholds(config)?,
            )?;
            runner.run(Arc::new(test)).await
        }
        SuiteKind::Api => {
            let test = ApiTest::new(
                client,
                config.scenario(kind.name())?,
                kind.thresholds(config)?,
            );
            runner.run(Arc::new(test)).await
        }
        SuiteKind::Mix => {
            let test = MixTest::new(client, runner.registry())?;
            runner.run(Arc::new(test)).await
        }
    }
}
