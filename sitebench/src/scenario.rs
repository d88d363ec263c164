use std::{collections::BTreeMap, collections::HashSet, time::Duration};

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    error::{Error, Result},
    threshold::ThresholdSet,
};

/// A stage holds `target` virtual users for `duration`.
///
/// Use `Stage::new(Duration::from_secs(60), 10)` for one minute at 10 VUs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Virtual users
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

/// Shape of the load a scenario puts on the target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "executor", rename_all = "kebab-case")]
pub enum LoadProfile {
    ConstantVus {
        vus: u32,
        #[serde(with = "humantime_serde")]
        duration: Duration,
    },
    RampingVus {
        #[serde(default)]
        start_vus: u32,
        stages: Vec<Stage>,
    },
}

impl LoadProfile {
    pub fn constant(vus: u32, duration: Duration) -> Self {
        LoadProfile::ConstantVus { vus, duration }
    }

    pub fn ramping(stages: Vec<Stage>) -> Self {
        LoadProfile::RampingVus {
            start_vus: 0,
            stages,
        }
    }

    /// The profile as consecutive constant segments.
    pub fn stages(&self) -> Vec<Stage> {
        match self {
            LoadProfile::ConstantVus { vus, duration } => vec![Stage::new(*duration, *vus)],
            LoadProfile::RampingVus { stages, .. } => stages.clone(),
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.stages().iter().map(|s| s.duration).sum()
    }

    pub fn max_vus(&self) -> u32 {
        let peak = self.stages().iter().map(|s| s.target).max().unwrap_or(0);
        match self {
            LoadProfile::RampingVus { start_vus, .. } => peak.max(*start_vus),
            LoadProfile::ConstantVus { .. } => peak,
        }
    }
}

/// A named load profile plus scheduling metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct Scenario {
    #[builder(setter(into))]
    pub name: String,
    #[serde(flatten)]
    pub profile: LoadProfile,
    /// Delay before the scenario starts, relative to the start of the run.
    #[builder(default)]
    #[serde(default, with = "humantime_serde")]
    pub start_time: Duration,
    /// How long in-flight iterations may run past the end of a stage.
    #[builder(default = Duration::from_secs(30))]
    #[serde(default = "default_graceful_stop", with = "humantime_serde")]
    pub graceful_stop: Duration,
    #[builder(default)]
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

fn default_graceful_stop() -> Duration {
    Duration::from_secs(30)
}

impl Scenario {
    /// Stage lists must be non-empty and every stage (or the constant
    /// duration) must be positive.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::InvalidScenario {
            scenario: self.name.clone(),
            reason,
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty".into()));
        }
        match &self.profile {
            LoadProfile::ConstantVus { duration, .. } => {
                if duration.is_zero() {
                    return Err(invalid("duration must be positive".into()));
                }
            }
            LoadProfile::RampingVus { stages, .. } => {
                if stages.is_empty() {
                    return Err(invalid("stage list is empty".into()));
                }
                if let Some(i) = stages.iter().position(|s| s.duration.is_zero()) {
                    return Err(invalid(format!("stage {i} has a zero duration")));
                }
            }
        }
        Ok(())
    }
}

/// Everything the scheduler needs to run one test: its scenarios and the
/// thresholds deciding pass or fail.
#[derive(Clone, Debug, Default, TypedBuilder)]
pub struct TestOptions {
    #[builder(default)]
    pub scenarios: Vec<Scenario>,
    #[builder(default)]
    pub thresholds: ThresholdSet,
}

impl TestOptions {
    pub fn validate(&self) -> Result<()> {
        if self.scenarios.is_empty() {
            return Err(Error::InvalidConfig("no scenario configured".into()));
        }
        let mut names = HashSet::new();
        for scenario in &self.scenarios {
            scenario.validate()?;
            if !names.insert(scenario.name.as_str()) {
                return Err(Error::InvalidScenario {
                    scenario: scenario.name.clone(),
                    reason: "duplicate scenario name".into(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn constant_profile_is_one_stage() {
        let p = LoadProfile::constant(5, secs(30));
        assert_eq!(p.stages(), vec![Stage::new(secs(30), 5)]);
        assert_eq!(p.total_duration(), secs(30));
        assert_eq!(p.max_vus(), 5);
    }

    #[test]
    fn ramping_profile_totals() {
        let p = LoadProfile::ramping(vec![
            Stage::new(secs(120), 10),
            Stage::new(secs(300), 50),
            Stage::new(secs(120), 100),
            Stage::new(secs(300), 100),
            Stage::new(secs(120), 0),
        ]);
        assert_eq!(p.total_duration(), secs(960));
        assert_eq!(p.max_vus(), 100);
    }

    #[test]
    fn empty_stage_list_is_rejected() {
        let s = Scenario::builder()
            .name("load")
            .profile(LoadProfile::ramping(vec![]))
            .build();
        assert!(matches!(s.validate(), Err(Error::InvalidScenario { .. })));
    }

    #[test]
    fn zero_duration_stage_is_rejected() {
        let s = Scenario::builder()
            .name("spike")
            .profile(LoadProfile::ramping(vec![
                Stage::new(secs(10), 100),
                Stage::new(Duration::ZERO, 0),
            ]))
            .build();
        let err = s.validate().unwrap_err().to_string();
        assert!(err.contains("stage 1"), "{err}");
    }

    #[test]
    fn zero_constant_duration_is_rejected() {
        let s = Scenario::builder()
            .name("smoke")
            .profile(LoadProfile::constant(1, Duration::ZERO))
            .build();
        assert!(s.validate().is_err());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let s = Scenario::builder()
            .name("smoke")
            .profile(LoadProfile::constant(1, secs(1)))
            .build();
        let options = TestOptions::builder().scenarios(vec![s.clone(), s]).build();
        assert!(matches!(
            options.validate(),
            Err(Error::InvalidScenario { scenario, .. }) if scenario == "smoke"
        ));
        let err = TestOptions::default().validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)), "{err}");
        assert_eq!(err.to_string(), "invalid configuration: no scenario configured");
    }

    #[test]
    fn deserializes_from_toml() {
        let s: Scenario = toml::from_str(
            r#"
            name = "ramping_load"
            executor = "ramping-vus"
            start_time = "2m"
            stages = [
                { duration = "1m", target = 20 },
                { duration = "2m", target = 20 },
                { duration = "1m", target = 0 },
            ]
            tags = { scenario = "ramping" }
            "#,
        )
        .unwrap();
        assert_eq!(s.start_time, secs(120));
        assert_eq!(s.graceful_stop, secs(30));
        assert_eq!(s.profile.total_duration(), secs(240));
        assert_eq!(s.tags["scenario"], "ramping");
        s.validate().unwrap();
    }
}
