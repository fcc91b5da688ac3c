//! Fault-tolerance policies for fan-out.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What to do when one of several concurrent calls does not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregationPolicy {
    /// Stop waiting on the first failure or cancellation and cancel the rest.
    FailFast,

    /// Wait for every call and record individual faults.
    #[default]
    BestEffort,
}

impl AggregationPolicy {
    /// Get the name of this policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FailFast => "fail-fast",
            Self::BestEffort => "best-effort",
        }
    }

    /// Check if a single non-success ends the aggregation.
    pub fn short_circuits(&self) -> bool {
        matches!(self, Self::FailFast)
    }
}

impl fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an unknown policy name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown aggregation policy: {0}")]
pub struct UnknownPolicy(pub String);

impl FromStr for AggregationPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "fail-fast" | "failfast" => Ok(Self::FailFast),
            "best-effort" | "besteffort" => Ok(Self::BestEffort),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}
