//! Observability infrastructure for the relay gateway.
//!
//! This crate provides:
//! - `events` - One `tracing` event per call, loop and aggregation milestone
//! - `init_logging` - Subscriber installation for binaries
//! - `MetricsCollector` / `RequestMetrics` - Per-request call timings

pub mod events;
mod logging;
mod metrics;

pub use logging::*;
pub use metrics::*;

// Re-export RequestId and TimingContext from relay-core for convenience
pub use relay_core::{RequestId, TimingContext};
