//! Upstream provider calls that honour cooperative cancellation.
//!
//! This crate provides:
//! - `ProviderTarget` / `Quote` - What is called and what comes back
//! - `Transport` - The outbound I/O boundary (`SimulatedTransport`, `HttpTransport`)
//! - `UpstreamCaller` - One call attempt, in a cancellable and a
//!   non-cancellable variant
//! - `CallOutcome` - Terminal state of a call

mod caller;
mod http;
mod provider;
mod transport;

pub use caller::*;
pub use http::*;
pub use provider::*;
pub use transport::*;
