//! Per-request timing metrics.

use std::time::Duration;

use relay_core::{Classification, RequestId, TimingContext};
use serde::{Deserialize, Serialize};

/// Metrics for a single upstream call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMetrics {
    /// Provider target identifier.
    pub target: String,
    /// Terminal outcome label (`succeeded`, `failed`, `cancelled`, `not_awaited`).
    pub outcome: String,
    /// Time from issue to terminal outcome, if one was observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Platform metrics for a single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetrics {
    /// Request ID for correlation.
    pub request_id: String,
    /// Endpoint that served the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Per-call timings in issuance order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<CallMetrics>,
    /// Loop units completed, for iterative endpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_units: Option<usize>,
    /// Total request duration.
    pub total_duration_ms: u64,
    /// Final classification.
    pub classification: Classification,
}

/// Collector for request metrics.
#[derive(Debug)]
pub struct MetricsCollector {
    request_id: RequestId,
    endpoint: Option<String>,
    timing: TimingContext,
    calls: Vec<CallMetrics>,
    loop_units: Option<usize>,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            endpoint: None,
            timing: TimingContext::new(),
            calls: Vec::new(),
            loop_units: None,
        }
    }

    /// Set the endpoint name.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Record one call outcome.
    pub fn record_call(
        &mut self,
        target: impl Into<String>,
        outcome: impl Into<String>,
        duration: Option<Duration>,
    ) {
        self.calls.push(CallMetrics {
            target: target.into(),
            outcome: outcome.into(),
            duration_ms: duration.map(|d| d.as_millis() as u64),
        });
    }

    /// Record how many loop units completed.
    pub fn record_loop_units(&mut self, units: usize) {
        self.loop_units = Some(units);
    }

    /// Elapsed time since the collector was created.
    pub fn elapsed(&self) -> Duration {
        self.timing.elapsed()
    }

    /// Finish collection with the final classification.
    pub fn finish(self, classification: Classification) -> RequestMetrics {
        RequestMetrics {
            request_id: self.request_id.to_string(),
            endpoint: self.endpoint,
            calls: self.calls,
            loop_units: self.loop_units,
            total_duration_ms: self.timing.elapsed().as_millis() as u64,
            classification,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_collects_calls_in_order() {
        let mut collector =
            MetricsCollector::new(RequestId::from_string("req-1")).with_endpoint("quotes");
        collector.record_call("p1", "succeeded", Some(Duration::from_millis(1000)));
        collector.record_call("p2", "not_awaited", None);
        tokio::time::sleep(Duration::from_millis(1200)).await;

        let metrics = collector.finish(Classification::Ok);

        assert_eq!(metrics.request_id, "req-1");
        assert_eq!(metrics.calls[0].target, "p1");
        assert_eq!(metrics.calls[1].duration_ms, None);
        assert!(metrics.total_duration_ms >= 1200);
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let metrics = MetricsCollector::new(RequestId::from_string("req-2"))
            .finish(Classification::DeadlineExceeded);
        let json = serde_json::to_value(&metrics).unwrap();

        assert!(json.get("calls").is_none());
        assert!(json.get("endpoint").is_none());
        assert_eq!(json["classification"], "deadline_exceeded");
    }
}
