//! Run configuration: target, HTTP defaults, named load profiles and named
//! threshold profiles.
//!
//! Every field has a default, so an empty file (or no file at all) gives the
//! stock setup. Named scenarios and threshold profiles from a file are laid
//! over the built-in ones, so a file only needs to list what it changes.

use std::{collections::BTreeMap, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    client::RequestOptions,
    error::{Error, Result},
    scenario::{LoadProfile, Scenario, Stage},
    threshold::ThresholdSet,
};

pub const DEFAULT_BASE_URL: &str = "https://othrondir.github.io/QAbbalah";

/// Constraint strings keyed by metric selector.
pub type ThresholdProfile = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(default)]
pub struct Config {
    #[builder(default = DEFAULT_BASE_URL.to_owned(), setter(into))]
    pub base_url: String,
    #[builder(default)]
    pub http: HttpConfig,
    #[builder(default = default_scenarios())]
    pub scenarios: BTreeMap<String, LoadProfile>,
    #[builder(default = default_thresholds())]
    pub thresholds: BTreeMap<String, ThresholdProfile>,
    /// Where file artifacts of the summary land.
    #[builder(default = "results".to_owned(), setter(into))]
    pub out_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Options applied to every request unless a call overrides them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            headers: BTreeMap::from([("User-Agent".to_owned(), "sitebench".to_owned())]),
        }
    }
}

impl HttpConfig {
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            headers: self.headers.clone(),
            timeout: Some(self.timeout),
        }
    }
}

fn default_scenarios() -> BTreeMap<String, LoadProfile> {
    let m = |mins: u64| Duration::from_secs(60 * mins);
    let s = Duration::from_secs;
    BTreeMap::from([
        ("smoke".to_owned(), LoadProfile::constant(1, s(30))),
        (
            "load".to_owned(),
            LoadProfile::ramping(vec![
                Stage::new(m(1), 10),
                Stage::new(m(3), 10),
                Stage::new(m(1), 0),
            ]),
        ),
        (
            "stress".to_owned(),
            LoadProfile::ramping(vec![
                Stage::new(m(2), 10),
                Stage::new(m(5), 50),
                Stage::new(m(2), 100),
                Stage::new(m(5), 100),
                Stage::new(m(2), 0),
            ]),
        ),
        (
            "spike".to_owned(),
            LoadProfile::ramping(vec![
                Stage::new(s(10), 100),
                Stage::new(m(1), 100),
                Stage::new(s(10), 0),
            ]),
        ),
        ("api".to_owned(), LoadProfile::constant(5, m(1))),
    ])
}

fn default_thresholds() -> BTreeMap<String, ThresholdProfile> {
    fn profile(entries: Vec<(&str, Vec<&str>)>) -> ThresholdProfile {
        entries
            .into_iter()
            .map(|(metric, exprs)| {
                (
                    metric.to_owned(),
                    exprs.into_iter().map(str::to_owned).collect(),
                )
            })
            .collect()
    }
    BTreeMap::from([
        (
            "default".to_owned(),
            profile(vec![
                ("http_req_duration", vec!["p(95)<500", "p(99)<1000"]),
                ("http_req_failed", vec!["rate<0.01"]),
                ("http_reqs", vec!["rate>10"]),
            ]),
        ),
        (
            "smoke".to_owned(),
            profile(vec![
                ("http_req_duration", vec!["p(95)<1000"]),
                ("http_req_failed", vec!["rate<0.01"]),
            ]),
        ),
        (
            "load".to_owned(),
            profile(vec![
                ("http_req_duration", vec!["p(95)<500", "p(99)<1000"]),
                ("http_req_failed", vec!["rate<0.01"]),
                ("http_reqs", vec!["rate>50"]),
            ]),
        ),
        (
            "stress".to_owned(),
            profile(vec![
                ("http_req_duration", vec!["p(95)<1000", "p(99)<2000"]),
                ("http_req_failed", vec!["rate<0.05"]),
            ]),
        ),
        (
            "api".to_owned(),
            profile(vec![
                ("http_req_duration", vec!["p(95)<300", "p(99)<500"]),
                ("http_req_failed", vec!["rate<0.01"]),
            ]),
        ),
    ])
}

impl Config {
    /// Reads a TOML file, fills in the built-in profiles and validates the result.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(text)?;
        let defaults = Config::default();
        for (name, profile) in defaults.scenarios {
            config.scenarios.entry(name).or_insert(profile);
        }
        for (name, profile) in defaults.thresholds {
            config.thresholds.entry(name).or_insert(profile);
        }
        config.validate()?;
        Ok(config)
    }

    /// Replaces the target when `base_url` is set.
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url {
            tracing::debug!("Base URL overridden to {url}");
            self.base_url = url;
        }
        self
    }

    /// Named load profile as a runnable scenario.
    pub fn scenario(&self, name: &str) -> Result<Scenario> {
        let profile = self
            .scenarios
            .get(name)
            .ok_or_else(|| Error::UnknownScenario(name.to_owned()))?;
        Ok(Scenario::builder()
            .name(name)
            .profile(profile.clone())
            .build())
    }

    /// Named threshold profile, parsed.
    pub fn thresholds(&self, name: &str) -> Result<ThresholdSet> {
        let profile = self
            .thresholds
            .get(name)
            .ok_or_else(|| Error::UnknownThresholdProfile(name.to_owned()))?;
        ThresholdSet::parse(profile)
    }

    /// Every scenario must be valid and every threshold profile must parse.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::InvalidConfig("base_url is empty".into()));
        }
        for name in self.scenarios.keys() {
            self.scenario(name)?.validate()?;
        }
        for name in self.thresholds.keys() {
            self.thresholds(name)?;
        }
        Ok(())
    }
}
