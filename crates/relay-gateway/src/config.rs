//! Gateway defaults and limits.

use std::time::Duration;

use relay_executor::AggregationPolicy;
use serde::{Deserialize, Serialize};

/// Configuration for request handling.
///
/// Every field has a default, so a partial TOML/JSON document deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Deadline applied when a request carries no `timeoutMs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_timeout_ms: Option<u64>,

    /// Provider latency when a request carries no `delayMs`.
    pub default_delay_ms: u64,

    /// Fan-out width when a request carries no `providerCount`.
    pub default_provider_count: usize,

    /// Upper bound on fan-out width.
    pub max_provider_count: usize,

    /// Iteration count when a request carries no `days`.
    pub default_days: usize,

    /// Upper bound on iteration count.
    pub max_iterations: usize,

    /// Aggregation policy when a request carries no `policy`.
    pub policy: AggregationPolicy,

    /// Successes required to accept a best-effort aggregation.
    pub min_successes: usize,

    /// Base URL for real providers; relative target addresses resolve against it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_base_url: Option<String>,
}

impl GatewayConfig {
    /// Default deadline, if configured.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// Set the default deadline.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the default aggregation policy.
    pub fn with_policy(mut self, policy: AggregationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the successes required to accept partial results.
    pub fn with_min_successes(mut self, min: usize) -> Self {
        self.min_successes = min;
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: None,
            default_delay_ms: 1000,
            default_provider_count: 3,
            max_provider_count: 16,
            default_days: 5,
            max_iterations: 365,
            policy: AggregationPolicy::BestEffort,
            min_successes: 1,
            provider_base_url: None,
        }
    }
}
