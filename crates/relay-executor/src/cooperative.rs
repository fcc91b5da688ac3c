//! Cooperative loops over units of work.
//!
//! The loop checks its signal before starting each unit and never starts
//! one after the signal has triggered. A unit already running is not
//! interrupted; it finishes or fails on its own terms, and may observe the
//! same signal at its own I/O boundaries.

use std::future::Future;

use relay_core::{CancelSource, CancellationSignal, GatewayError};
use relay_observability::events;
use tokio::time::Instant;

/// Why a cooperative loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// Every unit ran.
    Exhausted,
    /// The signal triggered before the next unit, or a unit gave up on it.
    Cancelled(CancelSource),
    /// A unit failed.
    Failed(GatewayError),
}

impl LoopStop {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Exhausted => "exhausted",
            Self::Cancelled(source) => source.as_str(),
            Self::Failed(_) => "failed",
        }
    }
}

/// Result of running a cooperative loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopReport<T> {
    /// Outputs of the units that completed, in order.
    pub outputs: Vec<T>,
    /// Why the loop stopped.
    pub stop: LoopStop,
}

impl<T> LoopReport<T> {
    /// Number of units that completed.
    pub fn units_completed(&self) -> usize {
        self.outputs.len()
    }

    /// The cancel source, if the loop stopped on cancellation.
    pub fn stopped_by(&self) -> Option<CancelSource> {
        match self.stop {
            LoopStop::Cancelled(source) => Some(source),
            _ => None,
        }
    }
}

/// Runs units strictly in order under a cancellation signal.
#[derive(Debug, Clone)]
pub struct CooperativeLoop {
    signal: CancellationSignal,
}

impl CooperativeLoop {
    /// Create a loop observing `signal`.
    pub fn new(signal: CancellationSignal) -> Self {
        Self { signal }
    }

    /// The signal this loop observes.
    pub fn signal(&self) -> &CancellationSignal {
        &self.signal
    }

    /// Run `work` over each item of `units`, which may be unbounded.
    ///
    /// `work` receives the unit index, the item and a handle to the loop's
    /// signal. A unit returning `GatewayError::Cancelled` ends the loop as
    /// cancelled without counting as completed.
    pub async fn run<I, F, Fut, T>(&self, units: I, mut work: F) -> LoopReport<T>
    where
        I: IntoIterator,
        F: FnMut(usize, I::Item, CancellationSignal) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut outputs = Vec::new();
        let mut units = units.into_iter();
        let mut index = 0;

        let stop = loop {
            if let Some(source) = self.signal.triggering_source() {
                break LoopStop::Cancelled(source);
            }
            let Some(unit) = units.next() else {
                break LoopStop::Exhausted;
            };

            let start = Instant::now();
            match work(index, unit, self.signal.clone()).await {
                Ok(output) => {
                    outputs.push(output);
                    events::loop_unit_completed(index, start.elapsed());
                }
                Err(GatewayError::Cancelled(source)) => break LoopStop::Cancelled(source),
                Err(error) => break LoopStop::Failed(error),
            }
            index += 1;
        };

        events::loop_stopped(outputs.len(), stop.label());
        LoopReport { outputs, stop }
    }
}
