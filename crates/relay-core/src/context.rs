//! Inbound request context with typed parameters.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cancel::CancellationSignal;
use crate::error::GatewayError;
use crate::lifecycle::TimingContext;

/// Unique request identifier for tracing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new request ID.
    pub fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("{:x}-{:x}", nanos, seq))
    }

    /// Create from an existing ID string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Query string parameters.
pub type QueryParams = HashMap<String, String>;

/// Handle the HTTP layer uses to report that the client went away.
#[derive(Debug, Clone)]
pub struct ClientAbort {
    signal: CancellationSignal,
}

impl ClientAbort {
    /// Report the client abort. Returns `false` if already reported.
    pub fn abort(&self) -> bool {
        self.signal.cancel()
    }
}

/// An inbound request as handed over by the HTTP layer.
#[derive(Debug)]
pub struct InboundRequest {
    /// Unique request identifier.
    pub request_id: RequestId,
    /// Request path.
    pub path: String,
    /// Query string parameters.
    pub query: QueryParams,
    /// Timing context for observability.
    pub timing: TimingContext,
    aborted: CancellationSignal,
}

impl InboundRequest {
    /// Create a new request and the handle that reports its abort.
    pub fn new(path: impl Into<String>) -> (Self, ClientAbort) {
        let aborted = CancellationSignal::new();
        let handle = ClientAbort {
            signal: aborted.clone(),
        };
        let request = Self {
            request_id: RequestId::generate(),
            path: path.into(),
            query: HashMap::new(),
            timing: TimingContext::new(),
            aborted,
        };
        (request, handle)
    }

    /// Add a query parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.insert(name.into(), value.to_string());
        self
    }

    /// Use an existing request ID (e.g. propagated from a header).
    pub fn with_request_id(mut self, id: RequestId) -> Self {
        self.request_id = id;
        self
    }

    /// The caller's abort notification.
    pub fn abort_signal(&self) -> &CancellationSignal {
        &self.aborted
    }

    /// Get a query parameter by name.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(|s| s.as_str())
    }

    /// Parse a query parameter, treating a malformed value as a logic error.
    pub fn query_parsed<T: FromStr>(&self, name: &str) -> Result<Option<T>, GatewayError> {
        match self.query_param(name) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| GatewayError::logic(format!("invalid value for '{}': {}", name, raw))),
        }
    }
}
