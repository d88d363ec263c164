//! Executor: the scheduler that turns a [`Scenario`]'s load profile into
//! running virtual users.
//!
//! The orchestration layer only describes load; executing it belongs to the
//! host. [`VuExecutor`] is the built-in host scheduler: it walks the profile's
//! stages and keeps each stage's target number of virtual users busy running
//! the test's iteration function for the stage's duration.
//!
//! # Lifecycle of one scenario
//! 1. Wait for the scenario's `start_time` offset.
//! 2. For every stage, spawn `target` VU tasks sharing a `watch` stop signal.
//!    Each VU runs the iteration action in a loop and checks the signal
//!    between iterations, so an iteration is never cut in half by a stage
//!    change.
//! 3. When the stage's duration is over, raise the stop signal and give
//!    in-flight iterations `graceful_stop` to finish before aborting them.
//!
//! Stages are held, not interpolated: a stage targeting 50 VUs runs 50 VUs
//! for its whole duration.
pub mod vu;
pub use vu::VuExecutor;

use crate::{error::Result, scenario::Scenario};
use std::future::Future;

/// The runtime hook that executes a [`Scenario`].
///
/// `action` is one iteration of the test. Implementations decide how many
/// copies run concurrently and for how long, and return the number of
/// completed iterations.
pub trait Executor
where
    Self: Send + Sync + Sized,
{
    fn exec<F, Fut>(
        &self,
        scenario: &Scenario,
        action: F,
    ) -> impl Future<Output = Result<u64>> + Send
    where
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ()> + Send + 'static;
}
