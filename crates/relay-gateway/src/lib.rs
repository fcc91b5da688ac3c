//! Request orchestration for the relay gateway.
//!
//! This crate glues one inbound request to its cancellation signal and to
//! the work it asks for:
//! - `GatewayConfig` - Defaults and limits for query parameters
//! - `Workload` - Iterative or fan-out work parsed from a request
//! - `RequestOrchestrator` - Derives the signal, dispatches, classifies
//! - `GatewayResponse` - Classified response with metrics

mod config;
mod orchestrator;
mod response;
mod workload;

pub use config::*;
pub use orchestrator::*;
pub use response::*;
pub use workload::*;

// Re-export the types callers need to build requests and read responses.
pub use relay_core::{CancelSource, Classification, ClientAbort, GatewayError, InboundRequest};
pub use relay_executor::AggregationPolicy;
