//! Error types for sitebench.

use thiserror::Error;

/// Fatal errors: anything that invalidates the premise of a run.
///
/// Failed checks are never represented here, they are recorded as metric data.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown route: `{0}`")]
    UnknownRoute(String),

    #[error("unknown scenario: `{0}`")]
    UnknownScenario(String),

    #[error("unknown threshold profile: `{0}`")]
    UnknownThresholdProfile(String),

    #[error("weighted set has no candidate with a positive weight")]
    EmptyWeightedSet,

    #[error("candidate {index} has invalid weight {weight}")]
    InvalidWeight { index: usize, weight: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid scenario `{scenario}`: {reason}")]
    InvalidScenario { scenario: String, reason: String },

    #[error("invalid threshold `{expr}` on `{metric}`: {reason}")]
    InvalidThreshold {
        metric: String,
        expr: String,
        reason: String,
    },

    #[error("metric `{name}` is already registered with a kind other than {expected}")]
    MetricKind { name: String, expected: &'static str },

    #[error("target {url} is not reachable: {reason}")]
    TargetUnreachable { url: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
