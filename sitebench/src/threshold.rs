//! Pass/fail constraints over aggregated metrics.
//!
//! Thresholds are written the way load-testing tools usually spell them:
//! a metric selector such as `http_req_duration` or
//! `http_req_duration{scenario:constant}` mapped to expressions like
//! `p(95)<500` or `rate<0.01`.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde_json::Value;

use crate::error::{Error, Result};

/// Statistic a threshold reads from a metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Med,
    Max,
    Count,
    Rate,
    Percentile(f64),
}

impl Aggregation {
    /// Key of this statistic in a metric's `values` object.
    pub fn key(&self) -> String {
        match self {
            Aggregation::Avg => "avg".into(),
            Aggregation::Min => "min".into(),
            Aggregation::Med => "med".into(),
            Aggregation::Max => "max".into(),
            Aggregation::Count => "count".into(),
            Aggregation::Rate => "rate".into(),
            Aggregation::Percentile(p) => format!("p({p})"),
        }
    }
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "avg" => Aggregation::Avg,
            "min" => Aggregation::Min,
            "med" => Aggregation::Med,
            "max" => Aggregation::Max,
            "count" => Aggregation::Count,
            "rate" => Aggregation::Rate,
            other => {
                let inner = other
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| format!("unknown aggregation `{other}`"))?;
                let p: f64 = inner
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid percentile `{inner}`"))?;
                if !(p > 0.0 && p <= 100.0) {
                    return Err(format!("percentile {p} is outside (0, 100]"));
                }
                Aggregation::Percentile(p)
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    // longest operators first so `<=` is not read as `<`
    const OPERATORS: [(&'static str, Comparison); 8] = [
        ("===", Comparison::Eq),
        ("<=", Comparison::Le),
        (">=", Comparison::Ge),
        ("==", Comparison::Eq),
        ("!=", Comparison::Ne),
        ("<", Comparison::Lt),
        (">", Comparison::Gt),
        ("=", Comparison::Eq),
    ];

    pub fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => observed < bound,
            Comparison::Le => observed <= bound,
            Comparison::Gt => observed > bound,
            Comparison::Ge => observed >= bound,
            Comparison::Eq => observed == bound,
            Comparison::Ne => observed != bound,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

/// One parsed constraint, e.g. `p(95)<500`.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub bound: f64,
}

impl Threshold {
    pub fn holds(&self, observed: f64) -> bool {
        self.comparison.holds(observed, self.bound)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.aggregation.key(),
            self.comparison.symbol(),
            self.bound
        )
    }
}

impl FromStr for Threshold {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let at = s
            .find(['<', '>', '=', '!'])
            .ok_or_else(|| "missing comparison operator".to_owned())?;
        let (lhs, rest) = s.split_at(at);
        let (symbol, comparison) = Comparison::OPERATORS
            .iter()
            .find(|(symbol, _)| rest.starts_with(symbol))
            .ok_or_else(|| format!("unknown operator in `{rest}`"))?;
        let rhs = rest[symbol.len()..].trim();
        let bound: f64 = rhs
            .parse()
            .map_err(|_| format!("`{rhs}` is not a number"))?;
        if !bound.is_finite() {
            return Err(format!("`{rhs}` is not a finite number"));
        }
        Ok(Threshold {
            aggregation: lhs.trim().parse()?,
            comparison: *comparison,
            bound,
        })
    }
}

/// Metric name with an optional tag filter, e.g.
/// `http_req_duration{scenario:constant}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Selector {
    pub metric: String,
    pub tags: BTreeMap<String, String>,
}

impl FromStr for Selector {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let (metric, filter) = match s.split_once('{') {
            Some((metric, rest)) => {
                let filter = rest
                    .strip_suffix('}')
                    .ok_or_else(|| "unterminated tag filter".to_owned())?;
                (metric, Some(filter))
            }
            None => (s, None),
        };
        if metric.is_empty() {
            return Err("empty metric name".into());
        }
        let mut tags = BTreeMap::new();
        for pair in filter.into_iter().flat_map(|f| f.split(',')) {
            let (k, v) = pair
                .split_once(':')
                .ok_or_else(|| format!("tag `{pair}` is not key:value"))?;
            tags.insert(k.trim().to_owned(), v.trim().to_owned());
        }
        Ok(Selector {
            metric: metric.to_owned(),
            tags,
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.metric)?;
        if !self.tags.is_empty() {
            let tags: Vec<_> = self.tags.iter().map(|(k, v)| format!("{k}:{v}")).collect();
            write!(f, "{{{}}}", tags.join(","))?;
        }
        Ok(())
    }
}

/// Result of checking one threshold against a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    pub selector: String,
    pub threshold: String,
    /// `None` when the metric or statistic was absent; such thresholds pass.
    pub observed: Option<f64>,
    pub passed: bool,
}

/// Thresholds keyed by selector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdSet {
    entries: BTreeMap<Selector, Vec<Threshold>>,
}

impl ThresholdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `selector -> [expression]` pairs; the first unparseable entry
    /// fails the whole set.
    pub fn parse<K, V, E>(raw: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: IntoIterator<Item = E>,
        E: AsRef<str>,
    {
        let mut set = Self::new();
        for (selector, exprs) in raw {
            let selector = selector.as_ref();
            let invalid = |expr: &str, reason: String| Error::InvalidThreshold {
                metric: selector.to_owned(),
                expr: expr.to_owned(),
                reason,
            };
            let parsed: Selector = selector.parse().map_err(|r| invalid("", r))?;
            for expr in exprs {
                let expr = expr.as_ref();
                let threshold: Threshold = expr.parse().map_err(|r| invalid(expr, r))?;
                set.entries.entry(parsed.clone()).or_default().push(threshold);
            }
        }
        Ok(set)
    }

    /// Adds the entries of `other`, keeping both sets' thresholds for shared selectors.
    pub fn extend(&mut self, other: ThresholdSet) {
        for (selector, thresholds) in other.entries {
            self.entries.entry(selector).or_default().extend(thresholds);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Selector, &Threshold)> {
        self.entries
            .iter()
            .flat_map(|(s, ts)| ts.iter().map(move |t| (s, t)))
    }

    /// Percentiles the thresholds ask for, so trends can compute them.
    pub fn percentiles(&self) -> Vec<f64> {
        let mut ps: Vec<f64> = self
            .iter()
            .filter_map(|(_, t)| match t.aggregation {
                Aggregation::Percentile(p) => Some(p),
                _ => None,
            })
            .collect();
        ps.sort_by(f64::total_cmp);
        ps.dedup();
        ps
    }

    /// Checks every threshold against `metrics`, the map of metric name to
    /// `{ "values": { .. } }` produced by the runtime.
    pub fn evaluate(&self, metrics: &Value) -> Vec<ThresholdOutcome> {
        self.iter()
            .map(|(selector, threshold)| {
                let key = selector.to_string();
                let observed = metrics
                    .get(&key)
                    .and_then(|m| m.get("values"))
                    .and_then(|v| v.get(threshold.aggregation.key()))
                    .and_then(Value::as_f64);
                let passed = match observed {
                    Some(value) => threshold.holds(value),
                    None => {
                        tracing::warn!(
                            metric = %key,
                            threshold = %threshold,
                            "no data for threshold, skipping"
                        );
                        true
                    }
                };
                ThresholdOutcome {
                    selector: key,
                    threshold: threshold.to_string(),
                    observed,
                    passed,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_common_expressions() {
        let t: Threshold = "p(95)<500".parse().unwrap();
        assert_eq!(t.aggregation, Aggregation::Percentile(95.0));
        assert_eq!(t.comparison, Comparison::Lt);
        assert_eq!(t.bound, 500.0);

        let t: Threshold = "rate <= 0.01".parse().unwrap();
        assert_eq!((t.aggregation, t.comparison), (Aggregation::Rate, Comparison::Le));

        let t: Threshold = "count>10".parse().unwrap();
        assert!(t.holds(11.0) && !t.holds(10.0));

        let t: Threshold = "p(99.9) < 2000".parse().unwrap();
        assert_eq!(t.aggregation.key(), "p(99.9)");
    }

    #[test]
    fn rejects_malformed_expressions() {
        for bad in ["p(95)", "p95<500", "p(0)<1", "p(101)<1", "avg<fast", "median<3", "<5"] {
            assert!(bad.parse::<Threshold>().is_err(), "{bad} parsed");
        }
    }

    #[test]
    fn selector_with_tags() {
        let s: Selector = "http_req_duration{scenario:constant}".parse().unwrap();
        assert_eq!(s.metric, "http_req_duration");
        assert_eq!(s.tags["scenario"], "constant");
        assert_eq!(s.to_string(), "http_req_duration{scenario:constant}");
        assert!("http_req_duration{scenario".parse::<Selector>().is_err());
    }

    #[test]
    fn set_reports_offending_entry() {
        let err = ThresholdSet::parse([("http_req_failed", vec!["rate<0.01", "rate<<"])])
            .unwrap_err();
        match err {
            Error::InvalidThreshold { metric, expr, .. } => {
                assert_eq!(metric, "http_req_failed");
                assert_eq!(expr, "rate<<");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn evaluates_against_raw_metrics() {
        let set = ThresholdSet::parse([
            ("http_req_duration", vec!["p(95)<500", "p(99)<1000"]),
            ("http_req_failed", vec!["rate<0.01"]),
            ("http_req_duration{scenario:spike}", vec!["p(95)<1000"]),
        ])
        .unwrap();
        assert_eq!(set.len(), 4);

        let metrics = json!({
            "http_req_duration": { "values": { "p(95)": 420.0, "p(99)": 1200.0 } },
            "http_req_failed": { "values": { "rate": 0.0 } },
        });
        let outcomes = set.evaluate(&metrics);
        let failed: Vec<_> = outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| o.threshold.as_str())
            .collect();
        assert_eq!(failed, ["p(99)<1000"]);

        let skipped = outcomes.iter().find(|o| o.observed.is_none()).unwrap();
        assert_eq!(skipped.selector, "http_req_duration{scenario:spike}");
        assert!(skipped.passed);
    }

    #[test]
    fn uncommon_percentiles_are_evaluated() {
        use std::time::Duration;

        use crate::metric::{HTTP_REQ_DURATION, Registry};

        let set = ThresholdSet::parse([("http_req_duration", vec!["p(99.9)<900", "p(50)<600"])])
            .unwrap();
        assert_eq!(set.percentiles(), [50.0, 99.9]);

        let registry = Registry::new();
        let trend = registry.trend(HTTP_REQ_DURATION).unwrap();
        for ms in 1..=1000 {
            trend.add_ms(ms as f64);
        }
        let metrics = registry.snapshot(Duration::from_secs(1), &set.percentiles());
        let outcomes = set.evaluate(&metrics);
        assert!(outcomes.iter().all(|o| o.observed.is_some()));
        let failed: Vec<_> = outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| o.threshold.as_str())
            .collect();
        assert_eq!(failed, ["p(99.9)<900"]);
    }
}
