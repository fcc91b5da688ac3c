//! Core abstractions for the relay gateway.
//!
//! This crate provides the fundamental types shared by every layer:
//! - `CancellationSignal` - Composable, push-notified cooperative cancellation
//! - `InboundRequest` - Query parameters plus the caller's abort notification
//! - `TimingContext` - Request timing marks
//! - `GatewayError` - Error taxonomy and response classification

mod cancel;
mod context;
mod error;
mod lifecycle;

pub use cancel::*;
pub use context::*;
pub use error::*;
pub use lifecycle::*;
