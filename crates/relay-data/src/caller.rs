//! One upstream call attempt.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use relay_core::{CancelSource, CancellationSignal, UpstreamError};
use relay_observability::events;
use serde::Serialize;
use tokio::time::Instant;

use crate::provider::{ProviderTarget, Quote};
use crate::transport::{Transport, TransportError};

/// Terminal (or unobserved) state of one upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// Never observed by the issuer (e.g. orphaned by a fail-fast short-circuit).
    Pending,
    /// The provider returned a quote.
    Succeeded(Quote),
    /// The provider failed for a reason other than cancellation.
    Failed(UpstreamError),
    /// The call stopped because its signal triggered.
    Cancelled(CancelSource),
}

impl CallOutcome {
    /// Check whether the call reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Check whether the call succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// Get the quote, if the call succeeded.
    pub fn quote(&self) -> Option<&Quote> {
        match self {
            Self::Succeeded(quote) => Some(quote),
            _ => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "not_awaited",
            Self::Succeeded(_) => "succeeded",
            Self::Failed(_) => "failed",
            Self::Cancelled(_) => "cancelled",
        }
    }
}

/// Whether a caller forwards its signal to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallCapability {
    /// The signal reaches the I/O boundary; calls can end `Cancelled`.
    Cancellable,
    /// The signal is dropped on the floor; calls always run to completion.
    NonCancellable,
}

impl CallCapability {
    /// Get the name of this capability.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancellable => "cancellable",
            Self::NonCancellable => "non_cancellable",
        }
    }
}

impl fmt::Display for CallCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issues a single call to a provider under a cancellation signal.
#[async_trait]
pub trait UpstreamCaller: Send + Sync {
    /// How this caller treats the signal.
    fn capability(&self) -> CallCapability;

    /// Call `target`, observing `signal` according to `capability()`.
    async fn invoke(&self, target: &ProviderTarget, signal: &CancellationSignal) -> CallOutcome;
}

/// Upstream caller over a `Transport`, parameterised by capability.
pub struct UpstreamClient {
    transport: Arc<dyn Transport>,
    capability: CallCapability,
}

impl UpstreamClient {
    /// Caller that forwards the signal to the transport.
    pub fn cancellable(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            capability: CallCapability::Cancellable,
        }
    }

    /// Caller that forgets to forward the signal.
    pub fn non_cancellable(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            capability: CallCapability::NonCancellable,
        }
    }

    /// Create a caller with an explicit capability.
    pub fn with_capability(transport: Arc<dyn Transport>, capability: CallCapability) -> Self {
        Self {
            transport,
            capability,
        }
    }

    async fn send(&self, target: &ProviderTarget, signal: &CancellationSignal) -> CallOutcome {
        match self.transport.send(target, signal).await {
            Ok(quote) => CallOutcome::Succeeded(quote),
            Err(TransportError::Failed(error)) => CallOutcome::Failed(error),
            Err(TransportError::Cancelled(source)) => CallOutcome::Cancelled(source),
        }
    }
}

impl fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl UpstreamCaller for UpstreamClient {
    fn capability(&self) -> CallCapability {
        self.capability
    }

    async fn invoke(&self, target: &ProviderTarget, signal: &CancellationSignal) -> CallOutcome {
        let start = Instant::now();
        events::call_started(&target.id, &target.address, self.capability.as_str());

        let outcome = match self.capability {
            // Observing a trigger means no new downstream work.
            CallCapability::Cancellable => match signal.triggering_source() {
                Some(source) => CallOutcome::Cancelled(source),
                None => self.send(target, signal).await,
            },
            CallCapability::NonCancellable => self.send(target, &CancellationSignal::none()).await,
        };

        match &outcome {
            CallOutcome::Succeeded(_) => events::call_completed(&target.id, start.elapsed()),
            CallOutcome::Failed(error) => events::call_failed(&target.id, start.elapsed(), error),
            CallOutcome::Cancelled(source) => {
                events::call_cancelled(&target.id, start.elapsed(), *source)
            }
            CallOutcome::Pending => {}
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SimulatedTransport;
    use std::time::Duration;

    fn callers() -> Vec<UpstreamClient> {
        let transport: Arc<dyn Transport> = Arc::new(SimulatedTransport::new());
        vec![
            UpstreamClient::cancellable(transport.clone()),
            UpstreamClient::non_cancellable(transport),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_variants_succeed_without_trigger() {
        for caller in callers() {
            let target = ProviderTarget::simulated("p1", Duration::from_millis(300));
            let outcome = caller.invoke(&target, &CancellationSignal::new()).await;
            assert!(outcome.is_success(), "{} should succeed", caller.capability());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_flight_trigger_splits_variants() {
        for caller in callers() {
            let target = ProviderTarget::simulated("slow", Duration::from_millis(5000));
            let signal = CancellationSignal::new();
            let _guard = signal.trigger_after(Duration::from_millis(1000));
            let start = Instant::now();

            let outcome = caller.invoke(&target, &signal).await;
            let elapsed = start.elapsed();

            match caller.capability() {
                CallCapability::Cancellable => {
                    assert_eq!(outcome, CallOutcome::Cancelled(CancelSource::Timeout));
                    assert!(elapsed < Duration::from_millis(1100));
                }
                CallCapability::NonCancellable => {
                    assert!(outcome.is_success());
                    assert!(elapsed >= Duration::from_millis(5000));
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_cancellable_still_reports_failures() {
        let caller = UpstreamClient::non_cancellable(Arc::new(SimulatedTransport::new()));
        let target = ProviderTarget::simulated("bad", Duration::from_millis(2000))
            .failing_at(Duration::from_millis(800));
        let signal = CancellationSignal::new();
        let _guard = signal.trigger_after(Duration::from_millis(100));

        let outcome = caller.invoke(&target, &signal).await;

        assert!(matches!(outcome, CallOutcome::Failed(UpstreamError::Injected { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_triggered_signal() {
        for caller in callers() {
            let signal = CancellationSignal::new();
            signal.cancel();
            let target = ProviderTarget::simulated("p1", Duration::from_millis(1000));
            let start = Instant::now();

            let outcome = caller.invoke(&target, &signal).await;

            match caller.capability() {
                CallCapability::Cancellable => {
                    assert_eq!(outcome, CallOutcome::Cancelled(CancelSource::Caller));
                    assert_eq!(start.elapsed(), Duration::ZERO);
                }
                CallCapability::NonCancellable => {
                    assert!(outcome.is_success());
                    assert!(start.elapsed() >= Duration::from_millis(1000));
                }
            }
        }
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(CallOutcome::Pending.label(), "not_awaited");
        assert!(!CallOutcome::Pending.is_terminal());
        assert!(CallOutcome::Cancelled(CancelSource::Timeout).is_terminal());
    }
}
