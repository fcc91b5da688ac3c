//! Error taxonomy and response classification.

use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelSource;

/// A provider call failed for a reason other than cancellation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("HTTP error: {status} for {url}")]
    Http { status: u16, url: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Provider '{target}' failed: {reason}")]
    Injected { target: String, reason: String },
}

/// Errors surfaced by the gateway core.
///
/// Cancellation and upstream failure are separate variants and must stay
/// that way: each maps to a different response classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Request cancelled by {0}")]
    Cancelled(CancelSource),

    #[error("Upstream failure: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Invalid request: {0}")]
    Logic(String),
}

impl GatewayError {
    /// Create a logic error.
    pub fn logic(message: impl Into<String>) -> Self {
        Self::Logic(message.into())
    }

    /// Map this error onto the outward response classification.
    pub fn classification(&self) -> Classification {
        match self {
            Self::Cancelled(CancelSource::Timeout) => Classification::DeadlineExceeded,
            Self::Cancelled(CancelSource::Caller) => Classification::ClientClosedRequest,
            // A fail-fast sibling abort only surfaces if it was never
            // attributed to the failure that caused it.
            Self::Cancelled(CancelSource::FailFast) => Classification::UpstreamFailure,
            Self::Upstream(_) => Classification::UpstreamFailure,
            Self::Logic(_) => Classification::BadRequest,
        }
    }
}

impl From<CancelSource> for GatewayError {
    fn from(source: CancelSource) -> Self {
        Self::Cancelled(source)
    }
}

/// Outward response classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Ok,
    ClientClosedRequest,
    DeadlineExceeded,
    UpstreamFailure,
    BadRequest,
}

impl Classification {
    /// HTTP status code for this classification.
    ///
    /// `ClientClosedRequest` uses the non-standard 499.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Ok => StatusCode::OK,
            Self::ClientClosedRequest => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST)
            }
            Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamFailure => StatusCode::BAD_GATEWAY,
            Self::BadRequest => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the name of this classification.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::ClientClosedRequest => "client_closed_request",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::UpstreamFailure => "upstream_failure",
            Self::BadRequest => "bad_request",
        }
    }

    /// Check if this is a success classification.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
