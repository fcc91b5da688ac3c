//! Provider targets and the quote payload.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One upstream provider to call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTarget {
    /// Stable identifier, used for ordering and logs.
    pub id: String,
    /// Address of the provider (absolute URL or path relative to a base URL).
    pub address: String,
    /// Configured latency for simulated providers, forwarded as `delayMs`
    /// to real ones.
    pub latency_ms: u64,
    /// Fail with an injected error after this many milliseconds instead of
    /// succeeding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_at_ms: Option<u64>,
}

impl ProviderTarget {
    /// Create a target for a simulated provider.
    pub fn simulated(id: impl Into<String>, latency: Duration) -> Self {
        let id = id.into();
        Self {
            address: format!("/providers/{}/quote", id),
            id,
            latency_ms: latency.as_millis() as u64,
            fail_at_ms: None,
        }
    }

    /// Set the provider address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Make the provider fail after `at` instead of succeeding.
    pub fn failing_at(mut self, at: Duration) -> Self {
        self.fail_at_ms = Some(at.as_millis() as u64);
        self
    }

    /// Configured latency.
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    /// Injected failure time, if any.
    pub fn fail_at(&self) -> Option<Duration> {
        self.fail_at_ms.map(Duration::from_millis)
    }
}

/// Payload returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Price in minor units.
    pub price: i64,
    /// ISO currency code.
    pub currency: String,
    /// When the provider produced the quote.
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Deterministic quote for a simulated provider.
    pub fn simulated(target_id: &str) -> Self {
        let hash = target_id
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
        Self {
            price: 100 + i64::from(hash % 900),
            currency: "USD".to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_target_builder() {
        let target = ProviderTarget::simulated("p2", Duration::from_millis(1500))
            .failing_at(Duration::from_millis(500));

        assert_eq!(target.address, "/providers/p2/quote");
        assert_eq!(target.latency(), Duration::from_millis(1500));
        assert_eq!(target.fail_at(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_simulated_quote_is_stable_per_target() {
        let a = Quote::simulated("p1");
        let b = Quote::simulated("p1");
        assert_eq!(a.price, b.price);
        assert!((100..1000).contains(&a.price));
        assert_eq!(a.currency, "USD");
    }

    #[test]
    fn test_quote_json_shape() {
        let json = r#"{"price": 420, "currency": "EUR", "timestamp": "2024-05-01T12:00:00Z"}"#;
        let quote: Quote = serde_json::from_str(json).unwrap();
        assert_eq!(quote.price, 420);
        assert_eq!(quote.currency, "EUR");
    }
}
