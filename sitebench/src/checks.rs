//! Check recording.
//!
//! [`Checks`] is the aggregator every assertion goes through. It is created
//! once per run, cloned into every component that performs checks, and read
//! once at the end when the summary is built.
//!
//! Each named check is recorded on its own: a bundle like "status is 200 AND
//! has body" leaves two entries behind, so a summary can tell which half
//! failed. A failed check is data, never an error: `record` hands the outcome
//! back so call sites can keep composing.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::metric::Rate;

/// Pass/fail tally of one named check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCounts {
    pub passes: u64,
    pub fails: u64,
}

impl CheckCounts {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }
}

#[derive(Debug, Clone, Default)]
pub struct Checks {
    inner: Arc<ChecksInner>,
}

#[derive(Debug, Default)]
struct ChecksInner {
    /// `true` samples are failures.
    errors: Rate,
    by_name: DashMap<String, CheckCounts>,
}

impl Checks {
    /// Aggregator backed by the given error-rate metric, usually the runtime's
    /// [`ERRORS`](crate::metric::ERRORS) rate.
    pub fn new(errors: Rate) -> Self {
        Self {
            inner: Arc::new(ChecksInner {
                errors,
                by_name: DashMap::new(),
            }),
        }
    }

    /// Records one named check and returns `passed` unchanged.
    pub fn record(&self, name: &str, passed: bool) -> bool {
        self.inner.errors.add(!passed);
        match self.inner.by_name.get_mut(name) {
            Some(mut counts) => bump(&mut counts, passed),
            None => bump(
                &mut self.inner.by_name.entry(name.to_owned()).or_default(),
                passed,
            ),
        }
        tracing::trace!(check = name, passed, "check recorded");
        passed
    }

    /// Records every check in the bundle and returns whether all of them passed.
    ///
    /// Every check is recorded even after one has failed.
    pub fn check<I, S>(&self, bundle: I) -> bool
    where
        I: IntoIterator<Item = (S, bool)>,
        S: AsRef<str>,
    {
        bundle
            .into_iter()
            .fold(true, |all, (name, passed)| self.record(name.as_ref(), passed) && all)
    }

    /// Failed / total, `0.0` when nothing was recorded.
    pub fn error_rate(&self) -> f64 {
        self.inner.errors.rate()
    }

    pub fn total(&self) -> u64 {
        self.inner.errors.total()
    }

    pub fn failures(&self) -> u64 {
        self.inner.errors.hits()
    }

    pub fn get(&self, name: &str) -> Option<CheckCounts> {
        self.inner.by_name.get(name).map(|c| *c)
    }

    /// Per-check tallies sorted by name.
    pub fn breakdown(&self) -> Vec<(String, CheckCounts)> {
        let mut all: Vec<_> = self
            .inner
            .by_name
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Breakdown in the shape the summary reporter reads.
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.breakdown()
                .into_iter()
                .map(|(name, c)| json!({ "name": name, "passes": c.passes, "fails": c.fails }))
                .collect(),
        )
    }
}

fn bump(counts: &mut CheckCounts, passed: bool) {
    if passed {
        counts.passes += 1;
    } else {
        counts.fails += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_checks_have_zero_error_rate() {
        let checks = Checks::default();
        assert_eq!(checks.total(), 0);
        assert_eq!(checks.error_rate(), 0.0);
    }

    #[test]
    fn error_rate_is_failures_over_total() {
        let checks = Checks::default();
        for i in 0..20 {
            checks.record("status is 200", i % 5 != 0);
        }
        assert_eq!(checks.total(), 20);
        assert_eq!(checks.failures(), 4);
        assert_eq!(checks.error_rate(), 0.2);
    }

    #[test]
    fn record_returns_outcome_unchanged() {
        let checks = Checks::default();
        assert!(checks.record("a", true));
        assert!(!checks.record("a", false));
        assert_eq!(checks.get("a"), Some(CheckCounts { passes: 1, fails: 1 }));
    }

    #[test]
    fn bundle_records_each_check_individually() {
        let checks = Checks::default();
        let ok = checks.check([
            ("status is 200", true),
            ("has body", false),
            ("response time < 2000ms", true),
        ]);
        assert!(!ok);
        assert_eq!(checks.total(), 3);
        assert_eq!(checks.failures(), 1);
        assert_eq!(checks.get("has body").unwrap().fails, 1);
        assert_eq!(checks.get("status is 200").unwrap().passes, 1);
    }

    #[test]
    fn clones_share_the_same_tally() {
        let registry = crate::metric::Registry::new();
        let errors = registry.rate(crate::metric::ERRORS).unwrap();
        let checks = Checks::new(errors.clone());
        let other = checks.clone();
        other.record("x", false);
        checks.record("x", true);
        assert_eq!(errors.total(), 2);
        assert_eq!(errors.rate(), 0.5);
        assert_eq!(checks.breakdown(), vec![("x".to_owned(), CheckCounts { passes: 1, fails: 1 })]);
    }

    #[tokio::test]
    async fn concurrent_recording() {
        let checks = Checks::default();
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let checks = checks.clone();
                tokio::spawn(async move {
                    for n in 0..100 {
                        checks.record("ok", n % 10 != 0);
                    }
                })
            })
            .collect();
        futures::future::join_all(tasks).await;
        assert_eq!(checks.total(), 1600);
        assert_eq!(checks.failures(), 160);
    }
}
