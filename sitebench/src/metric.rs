//! Metric primitives of the local host runtime.
//!
//! Handles are cheap to clone and safe to update from many virtual users at
//! once. Derived statistics (percentiles, means) are left to `hdrhistogram`;
//! this module only accumulates and snapshots.

use std::{
    collections::BTreeMap,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};

/// Total number of HTTP requests issued.
pub const HTTP_REQS: &str = "http_reqs";
/// Share of HTTP requests that failed at the transport or returned a non 2xx/3xx status.
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
/// Request duration in milliseconds.
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
/// Share of failed checks.
pub const ERRORS: &str = "errors";

/// Longest sample a trend resolves, one hour in microseconds. Longer samples
/// are recorded as this value.
const TREND_CEILING_US: u64 = 3_600_000_000;

/// Tags attached to every sample recorded by the current task.
pub type Tags = Arc<BTreeMap<String, String>>;

tokio::task_local! {
    static TAGS: Tags;
}

/// Runs `fut` with `tags` attached to the samples it records.
pub async fn with_tags<F: Future>(tags: Tags, fut: F) -> F::Output {
    TAGS.scope(tags, fut).await
}

/// Tags of the current task, if any.
pub fn current_tags() -> Option<Tags> {
    TAGS.try_with(Tags::clone).ok().filter(|t| !t.is_empty())
}

/// Name of the sub-metric holding `name`'s samples that carry `tags`,
/// e.g. `http_req_duration{scenario:constant}`.
pub fn tagged(name: &str, tags: &BTreeMap<String, String>) -> String {
    if tags.is_empty() {
        return name.to_owned();
    }
    let pairs: Vec<_> = tags.iter().map(|(k, v)| format!("{k}:{v}")).collect();
    format!("{name}{{{}}}", pairs.join(","))
}

/// Monotonically accumulating counter.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicU64>);

impl Counter {
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Ratio of `true` samples to all samples.
#[derive(Debug, Clone, Default)]
pub struct Rate(Arc<RateInner>);

#[derive(Debug, Default)]
struct RateInner {
    hits: AtomicU64,
    total: AtomicU64,
}

impl Rate {
    pub fn add(&self, hit: bool) {
        self.0.total.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.0.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn hits(&self) -> u64 {
        self.0.hits.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.0.total.load(Ordering::Relaxed)
    }

    /// `hits / total`, or `0.0` when nothing was recorded.
    pub fn rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.hits() as f64 / total as f64
    }
}

/// Distribution of millisecond samples.
///
/// Samples are stored in microseconds so sub-millisecond precision survives.
#[derive(Debug, Clone)]
pub struct Trend(Arc<Mutex<Histogram<u64>>>);

impl Default for Trend {
    fn default() -> Self {
        // 1µs to one hour at 3 significant figures; longer samples saturate
        let hist = Histogram::new_with_bounds(1, TREND_CEILING_US, 3)
            .expect("static histogram bounds are valid");
        Self(Arc::new(Mutex::new(hist)))
    }
}

impl Trend {
    pub fn add_ms(&self, ms: f64) {
        if !ms.is_finite() || ms < 0.0 {
            return;
        }
        self.0.lock().saturating_record((ms * 1000.0).round() as u64);
    }

    pub fn add(&self, sample: Duration) {
        self.add_ms(sample.as_secs_f64() * 1000.0);
    }

    pub fn len(&self) -> u64 {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Statistics in milliseconds: avg, min, med, max, `p(90)`, `p(95)`,
    /// `p(99)` and `p(N)` for every extra percentile.
    fn values(&self, percentiles: &[f64]) -> Map<String, Value> {
        let hist = self.0.lock();
        let ms = |us: f64| us / 1000.0;
        let at = |p: f64| {
            if hist.is_empty() {
                0.0
            } else {
                ms(hist.value_at_quantile(p / 100.0) as f64)
            }
        };
        let mut values = Map::new();
        if hist.is_empty() {
            for key in ["avg", "min", "max"] {
                values.insert(key.to_owned(), json!(0.0));
            }
        } else {
            values.insert("avg".into(), json!(ms(hist.mean())));
            values.insert("min".into(), json!(ms(hist.min() as f64)));
            values.insert("max".into(), json!(ms(hist.max() as f64)));
        }
        values.insert("med".into(), json!(at(50.0)));
        for p in [90.0, 95.0, 99.0].iter().chain(percentiles) {
            values.insert(format!("p({p})"), json!(at(*p)));
        }
        values
    }
}

#[derive(Debug, Clone)]
enum Handle {
    Counter(Counter),
    Rate(Rate),
    Trend(Trend),
}

impl Handle {
    fn kind(&self) -> &'static str {
        match self {
            Handle::Counter(_) => "counter",
            Handle::Rate(_) => "rate",
            Handle::Trend(_) => "trend",
        }
    }
}

/// Named metrics of one run.
///
/// `counter`, `rate` and `trend` return the existing handle when the name is
/// already registered with the same kind.
#[derive(Debug, Default)]
pub struct Registry {
    metrics: DashMap<String, Handle>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> Result<Counter> {
        match self.get_or_insert(name, || Handle::Counter(Counter::default())) {
            Handle::Counter(c) => Ok(c),
            _ => Err(kind_error(name, "counter")),
        }
    }

    pub fn rate(&self, name: &str) -> Result<Rate> {
        match self.get_or_insert(name, || Handle::Rate(Rate::default())) {
            Handle::Rate(r) => Ok(r),
            _ => Err(kind_error(name, "rate")),
        }
    }

    pub fn trend(&self, name: &str) -> Result<Trend> {
        match self.get_or_insert(name, || Handle::Trend(Trend::default())) {
            Handle::Trend(t) => Ok(t),
            _ => Err(kind_error(name, "trend")),
        }
    }

    fn get_or_insert(&self, name: &str, make: impl FnOnce() -> Handle) -> Handle {
        if let Some(handle) = self.metrics.get(name) {
            return handle.clone();
        }
        self.metrics.entry(name.to_owned()).or_insert_with(make).clone()
    }

    /// Raw metrics object: `{ name: { "type": .., "values": { .. } } }`.
    ///
    /// `elapsed` is the run time used for per-second counter rates. Trends
    /// carry `p(N)` for every entry of `percentiles` on top of the usual ones.
    pub fn snapshot(&self, elapsed: Duration, percentiles: &[f64]) -> Value {
        let secs = elapsed.as_secs_f64();
        let mut metrics = Map::new();
        for entry in self.metrics.iter() {
            let handle = entry.value();
            let values = match handle {
                Handle::Counter(c) => {
                    let count = c.count();
                    let per_sec = if secs > 0.0 { count as f64 / secs } else { 0.0 };
                    json!({ "count": count, "rate": per_sec })
                }
                Handle::Rate(r) => json!({
                    "rate": r.rate(),
                    "passes": r.hits(),
                    "fails": r.total().saturating_sub(r.hits()),
                }),
                Handle::Trend(t) => Value::Object(t.values(percentiles)),
            };
            metrics.insert(
                entry.key().clone(),
                json!({ "type": handle.kind(), "values": values }),
            );
        }
        Value::Object(metrics)
    }
}

fn kind_error(name: &str, expected: &'static str) -> Error {
    Error::MetricKind {
        name: name.to_owned(),
        expected,
    }
}
