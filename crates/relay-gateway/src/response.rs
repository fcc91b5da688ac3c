//! Classified responses.

use relay_core::{Classification, GatewayError, RequestId};
use relay_observability::RequestMetrics;
use serde::Serialize;
use serde_json::{json, Value};

/// Final response for one request.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayResponse {
    /// Request ID for correlation.
    pub request_id: String,
    /// Outward classification.
    pub classification: Classification,
    /// HTTP status code for `classification`.
    pub status: u16,
    /// Payload on success, error description otherwise.
    pub body: Value,
    /// Timings collected while handling the request.
    pub metrics: RequestMetrics,
    /// The error behind a non-success classification.
    #[serde(skip)]
    pub error: Option<GatewayError>,
}

impl GatewayResponse {
    /// Successful response carrying `body`.
    pub fn ok(request_id: &RequestId, body: Value, metrics: RequestMetrics) -> Self {
        Self {
            request_id: request_id.to_string(),
            classification: Classification::Ok,
            status: Classification::Ok.status().as_u16(),
            body,
            metrics,
            error: None,
        }
    }

    /// Error response. `partial` is attached as the `partial` field when
    /// work completed before the error.
    pub fn error(
        request_id: &RequestId,
        error: GatewayError,
        partial: Option<Value>,
        metrics: RequestMetrics,
    ) -> Self {
        let classification = error.classification();
        let mut body = json!({
            "error": classification.as_str(),
            "message": error.to_string(),
        });
        if let Some(partial) = partial {
            body["partial"] = partial;
        }

        Self {
            request_id: request_id.to_string(),
            classification,
            status: classification.status().as_u16(),
            body,
            metrics,
            error: Some(error),
        }
    }

    /// Check if the request succeeded.
    pub fn is_success(&self) -> bool {
        self.classification.is_success()
    }
}
