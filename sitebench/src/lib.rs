//! Sitebench: page-object load testing for a static website.
//!
//! Sitebench describes load against a site in terms of its pages. A load test
//! loads pages through a shared request client, verifies what came back with
//! named checks, and leaves pass or fail to thresholds evaluated at the end of
//! the run. Failed checks are data, never errors: an iteration always runs to
//! the end.
//!
//! # Architecture
//!
//! - [`Route`]: the site's canonical paths.
//! - [`RequestClient`]: builds URLs against the base, merges per-request options
//!   over the defaults and records assertions into [`Checks`].
//! - [`Page`]: Home, Posts, About and Feed, each with `load` and `verify_*`.
//!   New pages take one attribute, see [`macros::page`].
//! - [`WeightedSet`]: weighted random choice for traffic mixes.
//! - [`Scenario`] and [`ThresholdSet`]: declarative load profiles and the
//!   constraints that decide the run.
//! - [`Executor`]: runs a scenario's virtual users. [`VuExecutor`] is the
//!   built-in one.
//! - [`Runner`]: drives a [`LoadTest`] through setup, iterations, teardown and
//!   the summary hook, then evaluates thresholds.
//! - [`SummaryReport`]: console text and the JSON summary file.
//!
//! # Example
//!
//! ```rust, no_run
//! use std::sync::Arc;
//!
//! use sitebench::{Config, Runner, VuExecutor, suites::SmokeTest};
//!
//! #[tokio::main]
//! async fn main() -> sitebench::Result<()> {
//!     let config = Config::default();
//!     let runner = Runner::new(VuExecutor::default())?.with_out_dir(&config.out_dir);
//!
//!     // Clients are cheap to clone; build one per run, never per iteration.
//!     let client = runner.http_client(&config)?;
//!     let test = SmokeTest::new(
//!         client,
//!         config.scenario("smoke")?,
//!         config.thresholds("smoke")?,
//!     );
//!
//!     let outcome = runner.run(Arc::new(test)).await?;
//!     assert!(outcome.passed());
//!     Ok(())
//! }
//! ```

/// Named pass/fail checks and the error rate they feed
pub mod checks;
/// HTTP client, request options and responses
pub mod client;
/// Run configuration
pub mod config;
pub mod error;
/// Schedulers that run virtual users
pub mod executor;
/// Counters, rates, trends and the run's registry
pub mod metric;
/// Page objects
pub mod page;
/// Summaries and artifacts
pub mod report;
pub mod routes;
/// Test lifecycle
pub mod runner;
/// Load profiles and test options
pub mod scenario;
/// Ready-made suites
pub mod suites;
/// Threshold expressions and their evaluation
pub mod threshold;
/// Weighted choice and think time
pub mod traffic;

pub use checks::Checks;
pub use client::{RequestClient, RequestOptions, Response};
pub use config::Config;
pub use error::{Error, Result};
pub use executor::{Executor, VuExecutor};
pub use page::{Page, PageInfo};
pub use report::{Artifacts, SummaryReport, build_summary};
pub use routes::Route;
pub use runner::{LoadTest, RunOutcome, Runner, probe_target};
pub use scenario::{LoadProfile, Scenario, Stage, TestOptions};
pub use threshold::ThresholdSet;
pub use traffic::WeightedSet;

/// Procedural macros to reduce boilerplate
pub mod macros {
    pub use sitebench_macros::*;
}
