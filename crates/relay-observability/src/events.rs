//! Structured events emitted by the request core.
//!
//! The sink is whatever subscriber the binary installs.

use std::fmt::Display;
use std::time::Duration;

use relay_core::{CancelSource, Classification};

fn ms(d: Duration) -> u64 {
    d.as_millis() as u64
}

/// An upstream call was dispatched.
pub fn call_started(target: &str, address: &str, capability: &str) {
    tracing::debug!(target_id = target, address, capability, "call started");
}

/// An upstream call returned a value.
pub fn call_completed(target: &str, elapsed: Duration) {
    tracing::info!(target_id = target, elapsed_ms = ms(elapsed), "call completed");
}

/// An upstream call returned a fault.
pub fn call_failed(target: &str, elapsed: Duration, error: &dyn Display) {
    tracing::warn!(
        target_id = target,
        elapsed_ms = ms(elapsed),
        error = %error,
        "call failed"
    );
}

/// An upstream call was abandoned because its signal fired.
pub fn call_cancelled(target: &str, elapsed: Duration, source: CancelSource) {
    tracing::info!(
        target_id = target,
        elapsed_ms = ms(elapsed),
        cancelled_by = source.as_str(),
        "call cancelled"
    );
}

/// One unit of a cooperative loop finished.
pub fn loop_unit_completed(index: usize, elapsed: Duration) {
    tracing::info!(unit = index, elapsed_ms = ms(elapsed), "loop unit completed");
}

/// A cooperative loop stopped, either exhausted or cancelled.
pub fn loop_stopped(units_completed: usize, cause: &str) {
    tracing::info!(units_completed, cause, "loop stopped");
}

/// A fan-out began over `targets` calls.
pub fn aggregation_started(targets: usize, policy: &str) {
    tracing::info!(targets, policy, "aggregation started");
}

/// A fan-out settled.
pub fn aggregation_completed(succeeded: usize, failed: usize, status: &str, elapsed: Duration) {
    tracing::info!(
        succeeded,
        failed,
        status,
        elapsed_ms = ms(elapsed),
        "aggregation completed"
    );
}

/// Emitted when an orphaned fail-fast call finishes in the background.
pub fn orphan_discarded(target: &str) {
    tracing::debug!(target_id = target, "orphaned call result discarded");
}

/// Final classification of a request. Non-success outcomes log at warn.
pub fn request_classified(classification: Classification, elapsed: Duration) {
    if classification.is_success() {
        tracing::info!(
            classification = classification.as_str(),
            status = classification.status().as_u16(),
            elapsed_ms = ms(elapsed),
            "request classified"
        );
    } else {
        tracing::warn!(
            classification = classification.as_str(),
            status = classification.status().as_u16(),
            elapsed_ms = ms(elapsed),
            "request classified"
        );
    }
}
