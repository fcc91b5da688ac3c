//! Cooperative execution of request work.
//!
//! This crate provides:
//! - `CooperativeLoop` - In-order units that stop starting new work once cancelled
//! - `FanOutAggregator` - Concurrent provider calls under one signal
//! - `AggregationPolicy` - Fail-fast vs best-effort waiting

mod aggregator;
mod cooperative;
mod policy;

pub use aggregator::*;
pub use cooperative::*;
pub use policy::*;
