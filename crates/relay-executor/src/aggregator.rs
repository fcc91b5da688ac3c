//! Concurrent fan-out to upstream providers.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use relay_core::{CancelSource, CancellationSignal, GatewayError, UpstreamError};
use relay_data::{CallOutcome, ProviderTarget, UpstreamCaller};
use relay_observability::events;
use tokio::time::Instant;

use crate::policy::AggregationPolicy;

/// One call's entry in an aggregated result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallReport {
    /// Provider target identifier.
    pub target: String,
    /// What happened to the call.
    pub outcome: CallOutcome,
    /// Time from issue to terminal outcome, if one was observed.
    pub elapsed: Option<Duration>,
}

/// Overall status of an aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateStatus {
    /// Every call succeeded.
    AllSucceeded,
    /// Every call is terminal and at least one succeeded.
    Partial,
    /// Every call is terminal and none succeeded.
    NoneSucceeded,
    /// Fail-fast stopped waiting on the first non-success.
    ShortCircuited,
}

impl AggregateStatus {
    /// Get the name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllSucceeded => "all_succeeded",
            Self::Partial => "partial",
            Self::NoneSucceeded => "none_succeeded",
            Self::ShortCircuited => "short_circuited",
        }
    }
}

/// Per-call outcomes in issuance order plus the derived status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedResult {
    /// Policy the aggregation ran under.
    pub policy: AggregationPolicy,
    /// One report per target, in the order targets were issued.
    pub calls: Vec<CallReport>,
    /// Overall status.
    pub status: AggregateStatus,
    /// First non-success outcome to complete, as an error.
    pub first_fault: Option<GatewayError>,
    /// Wall-clock duration of the aggregation.
    pub elapsed: Duration,
}

impl AggregatedResult {
    /// Number of calls that succeeded.
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, CallOutcome::Succeeded(_)))
    }

    /// Number of calls that failed.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, CallOutcome::Failed(_)))
    }

    /// Number of calls that ended cancelled.
    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, CallOutcome::Cancelled(_)))
    }

    /// Number of calls that were not awaited.
    pub fn not_awaited(&self) -> usize {
        self.count(|o| matches!(o, CallOutcome::Pending))
    }

    /// Successful outcomes, in issuance order.
    pub fn successes(&self) -> impl Iterator<Item = &CallReport> {
        self.calls.iter().filter(|c| c.outcome.is_success())
    }

    fn count(&self, pred: impl Fn(&CallOutcome) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(&c.outcome)).count()
    }
}

fn fault_of(outcome: &CallOutcome) -> Option<GatewayError> {
    match outcome {
        CallOutcome::Failed(error) => Some(GatewayError::Upstream(error.clone())),
        CallOutcome::Cancelled(source) => Some(GatewayError::Cancelled(*source)),
        CallOutcome::Succeeded(_) | CallOutcome::Pending => None,
    }
}

/// Issues one upstream call per target, all at once, under a shared signal.
///
/// Calls run as Tokio tasks, so the aggregation takes as long as the
/// slowest call rather than the sum. Every call observes a child of the
/// request signal; under fail-fast that child is triggered with
/// `CancelSource::FailFast` on the first non-success, and calls still in
/// flight are left to wind down in the background with their results
/// discarded.
#[derive(Clone)]
pub struct FanOutAggregator {
    caller: Arc<dyn UpstreamCaller>,
}

impl FanOutAggregator {
    /// Create an aggregator issuing calls through `caller`.
    pub fn new(caller: Arc<dyn UpstreamCaller>) -> Self {
        Self { caller }
    }

    /// The caller used for every target.
    pub fn caller(&self) -> &Arc<dyn UpstreamCaller> {
        &self.caller
    }

    /// Call every target concurrently and combine the outcomes.
    pub async fn aggregate(
        &self,
        targets: &[ProviderTarget],
        signal: &CancellationSignal,
        policy: AggregationPolicy,
    ) -> Result<AggregatedResult, GatewayError> {
        if targets.is_empty() {
            return Err(GatewayError::logic("fan-out requires at least one target"));
        }

        let start = Instant::now();
        events::aggregation_started(targets.len(), policy.as_str());

        let scope = signal.child();
        let mut in_flight: FuturesUnordered<_> = targets
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, target)| {
                let caller = self.caller.clone();
                let scope = scope.clone();
                let handle = tokio::spawn(async move {
                    let issued = Instant::now();
                    let outcome = caller.invoke(&target, &scope).await;
                    (outcome, issued.elapsed())
                });
                async move { (index, handle.await) }
            })
            .collect();

        let mut calls: Vec<CallReport> = targets
            .iter()
            .map(|t| CallReport {
                target: t.id.clone(),
                outcome: CallOutcome::Pending,
                elapsed: None,
            })
            .collect();
        let mut first_fault = None;
        let mut short_circuited = false;

        while let Some((index, joined)) = in_flight.next().await {
            let (outcome, elapsed) = match joined {
                Ok(done) => done,
                Err(e) => (
                    CallOutcome::Failed(UpstreamError::Connection(format!(
                        "call task ended abnormally: {}",
                        e
                    ))),
                    start.elapsed(),
                ),
            };

            if first_fault.is_none() {
                first_fault = fault_of(&outcome);
            }
            calls[index].outcome = outcome;
            calls[index].elapsed = Some(elapsed);

            if policy.short_circuits() && first_fault.is_some() {
                short_circuited = true;
                break;
            }
        }

        if short_circuited {
            scope.trigger(CancelSource::FailFast);
            if !in_flight.is_empty() {
                let orphans: Vec<String> = calls.iter().map(|c| c.target.clone()).collect();
                tokio::spawn(async move {
                    while let Some((index, _)) = in_flight.next().await {
                        events::orphan_discarded(&orphans[index]);
                    }
                });
            }
        }

        let mut result = AggregatedResult {
            policy,
            calls,
            status: AggregateStatus::ShortCircuited,
            first_fault,
            elapsed: start.elapsed(),
        };
        if !short_circuited {
            result.status = match result.succeeded() {
                n if n == result.calls.len() => AggregateStatus::AllSucceeded,
                0 => AggregateStatus::NoneSucceeded,
                _ => AggregateStatus::Partial,
            };
        }

        events::aggregation_completed(
            result.succeeded(),
            result.failed() + result.cancelled(),
            result.status.as_str(),
            result.elapsed,
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_data::{CallCapability, SimulatedTransport, Transport, UpstreamClient};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn aggregator(capability: CallCapability) -> FanOutAggregator {
        let transport: Arc<dyn Transport> = Arc::new(SimulatedTransport::new());
        FanOutAggregator::new(Arc::new(UpstreamClient::with_capability(transport, capability)))
    }

    fn targets(latencies: &[u64]) -> Vec<ProviderTarget> {
        latencies
            .iter()
            .enumerate()
            .map(|(i, l)| ProviderTarget::simulated(format!("p{}", i + 1), ms(*l)))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_effort_takes_max_not_sum() {
        let result = aggregator(CallCapability::Cancellable)
            .aggregate(
                &targets(&[1000, 1500, 2000]),
                &CancellationSignal::new(),
                AggregationPolicy::BestEffort,
            )
            .await
            .unwrap();

        assert!(result.elapsed >= ms(2000));
        assert!(result.elapsed < ms(2100));
        assert_eq!(result.status, AggregateStatus::AllSucceeded);
        assert_eq!(result.succeeded(), 3);
        let order: Vec<&str> = result.calls.iter().map(|c| c.target.as_str()).collect();
        assert_eq!(order, vec!["p1", "p2", "p3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_follows_issuance_not_completion() {
        let result = aggregator(CallCapability::Cancellable)
            .aggregate(
                &targets(&[900, 100, 500]),
                &CancellationSignal::new(),
                AggregationPolicy::BestEffort,
            )
            .await
            .unwrap();

        let order: Vec<&str> = result.calls.iter().map(|c| c.target.as_str()).collect();
        assert_eq!(order, vec!["p1", "p2", "p3"]);
        let fastest = result.calls[1].elapsed.unwrap();
        assert!(fastest >= ms(100) && fastest < ms(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_effort_records_failures_and_keeps_going() {
        let mut list = targets(&[1000, 2000, 1500]);
        list[1] = list[1].clone().failing_at(ms(500));

        let result = aggregator(CallCapability::Cancellable)
            .aggregate(&list, &CancellationSignal::new(), AggregationPolicy::BestEffort)
            .await
            .unwrap();

        assert_eq!(result.status, AggregateStatus::Partial);
        assert_eq!(result.succeeded(), 2);
        assert_eq!(result.failed(), 1);
        assert!(matches!(result.calls[1].outcome, CallOutcome::Failed(_)));
        assert!(matches!(result.first_fault, Some(GatewayError::Upstream(_))));
        assert!(result.elapsed >= ms(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_returns_on_first_failure() {
        let mut list = targets(&[2000, 2000, 2000]);
        list[1] = list[1].clone().failing_at(ms(500));

        let result = aggregator(CallCapability::Cancellable)
            .aggregate(&list, &CancellationSignal::new(), AggregationPolicy::FailFast)
            .await
            .unwrap();

        assert!(result.elapsed < ms(600));
        assert_eq!(result.status, AggregateStatus::ShortCircuited);
        assert!(matches!(
            result.first_fault,
            Some(GatewayError::Upstream(UpstreamError::Injected { ref target, .. })) if target == "p2"
        ));
        assert_eq!(result.calls[0].outcome, CallOutcome::Pending);
        assert_eq!(result.calls[2].outcome, CallOutcome::Pending);
        assert_eq!(result.not_awaited(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_cancels_orphans_in_background() {
        struct Counting {
            inner: UpstreamClient,
            cancelled: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl UpstreamCaller for Counting {
            fn capability(&self) -> CallCapability {
                self.inner.capability()
            }

            async fn invoke(
                &self,
                target: &ProviderTarget,
                signal: &CancellationSignal,
            ) -> CallOutcome {
                let outcome = self.inner.invoke(target, signal).await;
                if outcome == CallOutcome::Cancelled(CancelSource::FailFast) {
                    self.cancelled.fetch_add(1, Ordering::SeqCst);
                }
                outcome
            }
        }

        let cancelled = Arc::new(AtomicUsize::new(0));
        let caller = Counting {
            inner: UpstreamClient::cancellable(Arc::new(SimulatedTransport::new())),
            cancelled: cancelled.clone(),
        };
        let mut list = targets(&[5000, 5000, 5000]);
        list[0] = list[0].clone().failing_at(ms(100));
        let request = CancellationSignal::new();

        FanOutAggregator::new(Arc::new(caller))
            .aggregate(&list, &request, AggregationPolicy::FailFast)
            .await
            .unwrap();
        tokio::time::sleep(ms(10)).await;

        assert_eq!(cancelled.load(Ordering::SeqCst), 2);
        // The short-circuit stays inside the aggregation.
        assert!(!request.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_cancels_every_call() {
        let signal = CancellationSignal::new();
        let _guard = signal.trigger_after(ms(2000));

        let result = aggregator(CallCapability::Cancellable)
            .aggregate(&targets(&[5000, 5000]), &signal, AggregationPolicy::BestEffort)
            .await
            .unwrap();

        assert!(result.elapsed < ms(2100));
        assert_eq!(result.status, AggregateStatus::NoneSucceeded);
        assert_eq!(result.cancelled(), 2);
        assert_eq!(
            result.first_fault,
            Some(GatewayError::Cancelled(CancelSource::Timeout))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_cancellable_calls_ignore_request_timeout() {
        let signal = CancellationSignal::new();
        let _guard = signal.trigger_after(ms(2000));

        let result = aggregator(CallCapability::NonCancellable)
            .aggregate(&targets(&[5000, 5000]), &signal, AggregationPolicy::BestEffort)
            .await
            .unwrap();

        assert!(result.elapsed >= ms(5000));
        assert_eq!(result.status, AggregateStatus::AllSucceeded);
        assert!(signal.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_targets_is_logic_error() {
        let err = aggregator(CallCapability::Cancellable)
            .aggregate(&[], &CancellationSignal::new(), AggregationPolicy::BestEffort)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Logic(_)));
    }
}
