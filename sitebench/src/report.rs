//! Run summaries and the artifacts they are written to.
//!
//! [`SummaryReport`] is the structure pulled out of the raw metrics object at
//! the end of a run. Building it never fails: any metric or statistic that is
//! missing or not a number reads as zero. [`Artifacts`] are the named outputs
//! of the summary hook, and [`Reporter`]s send them somewhere.

use std::{
    collections::BTreeMap,
    fmt::Write as _,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::{
    error::Result,
    metric::{HTTP_REQ_DURATION, HTTP_REQ_FAILED, HTTP_REQS},
};

/// Artifact key printed to the console instead of written to disk.
pub const STDOUT: &str = "stdout";
/// Default file name of the JSON summary.
pub const SUMMARY_FILE: &str = "summary.json";
/// Counter reported as `custom_counter`.
pub const CUSTOM_REQUESTS: &str = "custom_requests";

/// Pass/fail tally of one named check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckLine {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

/// Condensed view of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    #[serde(serialize_with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    pub total_requests: u64,
    /// Fraction of failed requests, in `[0, 1]`.
    pub failed_rate: f64,
    /// Milliseconds
    pub avg_duration: f64,
    pub p95_duration: f64,
    pub p99_duration: f64,
    /// Count of `custom_requests`, zero when no iteration triggered it.
    pub custom_counter: u64,
    /// Every counter other than `http_reqs` and `custom_requests`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_counters: BTreeMap<String, u64>,
    #[serde(skip)]
    pub checks: Vec<CheckLine>,
}

fn iso8601<S: Serializer>(ts: &DateTime<Utc>, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Builds the summary of `raw`, stamped with the current time.
pub fn build_summary(raw: &Value) -> SummaryReport {
    build_summary_at(raw, Utc::now())
}

/// Builds the summary of `raw` with a fixed timestamp.
///
/// `raw` is the runtime's metrics object (`{ "metrics": { .. }, "checks": [ .. ] }`).
pub fn build_summary_at(raw: &Value, timestamp: DateTime<Utc>) -> SummaryReport {
    let metrics = raw.get("metrics");

    let custom_counters: BTreeMap<String, u64> = metrics
        .and_then(Value::as_object)
        .map(|all| {
            all.iter()
                .filter(|(name, m)| {
                    ![HTTP_REQS, CUSTOM_REQUESTS].contains(&name.as_str())
                        && m.get("type").and_then(Value::as_str) == Some("counter")
                })
                .map(|(name, m)| (name.clone(), count(m.get("values"))))
                .collect()
        })
        .unwrap_or_default();

    SummaryReport {
        timestamp,
        total_requests: count(values(metrics, HTTP_REQS)),
        failed_rate: stat(metrics, HTTP_REQ_FAILED, "rate").clamp(0.0, 1.0),
        avg_duration: stat(metrics, HTTP_REQ_DURATION, "avg"),
        p95_duration: stat(metrics, HTTP_REQ_DURATION, "p(95)"),
        p99_duration: stat(metrics, HTTP_REQ_DURATION, "p(99)"),
        custom_counter: count(values(metrics, CUSTOM_REQUESTS)),
        custom_counters,
        checks: check_lines(raw.get("checks")),
    }
}

fn values<'a>(metrics: Option<&'a Value>, name: &str) -> Option<&'a Value> {
    metrics?.get(name)?.get("values")
}

fn stat(metrics: Option<&Value>, name: &str, key: &str) -> f64 {
    values(metrics, name)
        .and_then(|v| v.get(key))
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn count(values: Option<&Value>) -> u64 {
    let Some(count) = values.and_then(|v| v.get("count")) else {
        return 0;
    };
    count
        .as_u64()
        .or_else(|| {
            count
                .as_f64()
                .filter(|c| c.is_finite() && *c >= 0.0)
                .map(|c| c as u64)
        })
        .unwrap_or(0)
}

fn check_lines(checks: Option<&Value>) -> Vec<CheckLine> {
    checks
        .and_then(Value::as_array)
        .map(|all| {
            all.iter()
                .filter_map(|c| serde_json::from_value(c.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

impl SummaryReport {
    /// Console rendering of the summary.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        // writing to a String cannot fail
        let _ = writeln!(out, "\n=== Performance Test Summary ===");
        let _ = writeln!(out, "Total Requests: {}", self.total_requests);
        let _ = writeln!(out, "Failed Requests: {:.2}%", self.failed_rate * 100.0);
        let _ = writeln!(out, "Average Response Time: {:.2}ms", self.avg_duration);
        let _ = writeln!(out, "p95 Response Time: {:.2}ms", self.p95_duration);
        let _ = writeln!(out, "p99 Response Time: {:.2}ms", self.p99_duration);
        if self.custom_counter > 0 {
            let _ = writeln!(out, "{CUSTOM_REQUESTS}: {}", self.custom_counter);
        }
        for (name, value) in &self.custom_counters {
            let _ = writeln!(out, "{name}: {value}");
        }
        if !self.checks.is_empty() {
            let _ = writeln!(out, "\nChecks:");
            for check in &self.checks {
                let mark = if check.fails == 0 { '✓' } else { '✗' };
                let total = check.passes + check.fails;
                let _ = writeln!(out, "  {mark} {} ({}/{total})", check.name, check.passes);
            }
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Named outputs of the summary hook: the console text under [`STDOUT`], file
/// contents under their file names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts(BTreeMap<String, String>);

impl Artifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(key, content);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, content: impl Into<String>) {
        self.0.insert(key.into(), content.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn stdout(&self) -> Option<&str> {
        self.get(STDOUT)
    }

    /// Every artifact except the console text.
    pub fn files(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter(|(k, _)| k.as_str() != STDOUT)
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Default summary hook: console text plus `summary.json`.
pub fn handle_summary(raw: &Value) -> Result<Artifacts> {
    let summary = build_summary(raw);
    Ok(Artifacts::new()
        .with(STDOUT, summary.render_text())
        .with(SUMMARY_FILE, summary.to_json()?))
}

/// Sends artifacts somewhere.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, artifacts: &Artifacts) -> Result<()>;
}

/// Prints the [`STDOUT`] artifact.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutReporter;

#[async_trait]
impl Reporter for StdoutReporter {
    async fn report(&self, artifacts: &Artifacts) -> Result<()> {
        if let Some(text) = artifacts.stdout() {
            println!("{text}");
        }
        Ok(())
    }
}

/// Writes every file artifact under `out_dir`, creating it when needed.
#[derive(Debug, Clone)]
pub struct FileReporter {
    out_dir: PathBuf,
}

impl FileReporter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }
}

#[async_trait]
impl Reporter for FileReporter {
    async fn report(&self, artifacts: &Artifacts) -> Result<()> {
        if artifacts.files().next().is_none() {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.out_dir).await?;
        for (name, content) in artifacts.files() {
            let path = self.out_dir.join(name);
            tokio::fs::write(&path, content).await?;
            tracing::info!("Wrote {}", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn raw() -> Value {
        json!({
            "metrics": {
                "http_reqs": { "type": "counter", "values": { "count": 120, "rate": 4.0 } },
                "http_req_failed": {
                    "type": "rate",
                    "values": { "rate": 0.025, "passes": 3, "fails": 117 },
                },
                "http_req_duration": { "type": "trend", "values": {
                    "avg": 210.5, "min": 80.0, "med": 190.0, "max": 900.0,
                    "p(90)": 300.0, "p(95)": 410.25, "p(99)": 780.0
                } },
                "custom_requests": { "type": "counter", "values": { "count": 118, "rate": 3.9 } },
            },
            "checks": [
                { "name": "status is 200", "passes": 117, "fails": 3 },
                { "name": "response has body", "passes": 120, "fails": 0 },
            ],
        })
    }

    #[test]
    fn summary_reads_builtins() {
        let s = build_summary_at(&raw(), at());
        assert_eq!(s.total_requests, 120);
        assert_eq!(s.failed_rate, 0.025);
        assert_eq!(s.avg_duration, 210.5);
        assert_eq!(s.p95_duration, 410.25);
        assert_eq!(s.p99_duration, 780.0);
        assert_eq!(s.custom_counter, 118);
        assert!(s.custom_counters.is_empty());
        assert_eq!(s.checks.len(), 2);
    }

    #[test]
    fn custom_requests_is_reported_once() {
        let mut raw = raw();
        raw["metrics"]["page_views"] = json!({ "type": "counter", "values": { "count": 9 } });
        let s = build_summary_at(&raw, at());
        assert_eq!(s.custom_counter, 118);
        assert_eq!(s.custom_counters, BTreeMap::from([("page_views".to_owned(), 9)]));

        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["custom_counters"], json!({ "page_views": 9 }));
        assert_eq!(s.render_text().matches(CUSTOM_REQUESTS).count(), 1);
    }

    #[test]
    fn missing_metrics_read_as_zero() {
        for raw in [json!({}), json!({ "metrics": {} }), json!(null), json!([1, 2])] {
            let s = build_summary_at(&raw, at());
            assert_eq!(s.total_requests, 0);
            assert_eq!(s.failed_rate, 0.0);
            assert_eq!(s.avg_duration, 0.0);
            assert_eq!(s.p95_duration, 0.0);
            assert_eq!(s.p99_duration, 0.0);
            assert_eq!(s.custom_counter, 0);
            assert!(s.checks.is_empty());
        }
    }

    #[test]
    fn malformed_fields_read_as_zero() {
        let raw = json!({
            "metrics": {
                "http_reqs": { "values": { "count": "lots" } },
                "http_req_failed": { "values": null },
                "http_req_duration": "fast",
            },
            "checks": [{ "name": 3 }, { "name": "ok", "passes": 1, "fails": 0 }],
        });
        let s = build_summary_at(&raw, at());
        assert_eq!(s.total_requests, 0);
        assert_eq!(s.failed_rate, 0.0);
        assert_eq!(s.p99_duration, 0.0);
        assert_eq!(s.checks.len(), 1);
    }

    #[test]
    fn json_has_fixed_schema() {
        let s = build_summary_at(&raw(), at());
        let v: Value = serde_json::from_str(&s.to_json().unwrap()).unwrap();
        assert_eq!(v["timestamp"], "2024-05-01T12:00:00.000Z");
        assert_eq!(v["total_requests"], 120);
        assert_eq!(v["failed_rate"], 0.025);
        assert_eq!(v["p95_duration"], 410.25);
        assert_eq!(v["custom_counter"], 118);
        assert!(v.get("checks").is_none());
    }

    #[test]
    fn text_lists_headline_numbers() {
        let text = build_summary_at(&raw(), at()).render_text();
        assert!(text.contains("Total Requests: 120"));
        assert!(text.contains("Failed Requests: 2.50%"));
        assert!(text.contains("p95 Response Time: 410.25ms"));
        assert!(text.contains("✗ status is 200 (117/120)"));
        assert!(text.contains("✓ response has body (120/120)"));
    }

    #[test]
    fn default_hook_emits_console_and_file() {
        let artifacts = handle_summary(&raw()).unwrap();
        assert!(artifacts.stdout().unwrap().contains("Performance Test Summary"));
        let files: Vec<_> = artifacts.files().map(|(k, _)| k).collect();
        assert_eq!(files, vec![SUMMARY_FILE]);
    }

    #[tokio::test]
    async fn file_reporter_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("results");
        let artifacts = Artifacts::new()
            .with(STDOUT, "ignored")
            .with("summary.json", "{}");
        FileReporter::new(&out).report(&artifacts).await.unwrap();
        assert_eq!(std::fs::read_to_string(out.join("summary.json")).unwrap(), "{}");
        assert!(!out.join(STDOUT).exists());
    }
}
