//! Request orchestration.
//!
//! One inbound request gets one cancellation signal, derived from the
//! client's abort notification and, when a budget is set, a deadline. The
//! orchestrator drives the requested work under that signal and maps the
//! terminal state onto a response classification.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use relay_core::{
    CancellationSignal, Classification, GatewayError, InboundRequest, LifecyclePhase, TimerGuard,
};
use relay_data::{
    CallCapability, CallOutcome, HttpTransport, ProviderTarget, Quote, SimulatedTransport,
    Transport, UpstreamCaller, UpstreamClient,
};
use relay_executor::{AggregateStatus, AggregationPolicy, CooperativeLoop, FanOutAggregator, LoopStop};
use relay_observability::{events, MetricsCollector};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::GatewayConfig;
use crate::response::GatewayResponse;
use crate::workload::{params, Workload};

/// One completed day of a forecast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForecastDay {
    /// Day number, starting at 1.
    pub day: usize,
    /// Quote returned for the day.
    pub quote: Quote,
}

/// Error plus whatever work finished before it.
struct Failure {
    error: GatewayError,
    partial: Option<Value>,
}

impl From<GatewayError> for Failure {
    fn from(error: GatewayError) -> Self {
        Self {
            error,
            partial: None,
        }
    }
}

/// Entry point for one inbound request.
#[derive(Clone)]
pub struct RequestOrchestrator {
    config: GatewayConfig,
    aggregator: FanOutAggregator,
}

impl RequestOrchestrator {
    /// Create an orchestrator issuing every provider call through `caller`.
    pub fn new(config: GatewayConfig, caller: Arc<dyn UpstreamCaller>) -> Self {
        Self {
            config,
            aggregator: FanOutAggregator::new(caller),
        }
    }

    /// Create an orchestrator from configuration alone.
    ///
    /// Calls go over HTTP when `provider_base_url` is set and to simulated
    /// providers otherwise.
    pub fn from_config(config: GatewayConfig, capability: CallCapability) -> Self {
        let transport: Arc<dyn Transport> = match &config.provider_base_url {
            Some(url) => Arc::new(HttpTransport::new().with_base_url(url.clone())),
            None => Arc::new(SimulatedTransport::new()),
        };
        let caller = Arc::new(UpstreamClient::with_capability(transport, capability));
        Self::new(config, caller)
    }

    /// The active configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Derive the request signal from the client abort and an optional
    /// deadline.
    ///
    /// The returned guard keeps the deadline armed; dropping it disarms the
    /// timer.
    pub fn derive_signal(
        abort: &CancellationSignal,
        timeout: Option<Duration>,
    ) -> (CancellationSignal, Option<TimerGuard>) {
        match timeout {
            None => (abort.child(), None),
            Some(budget) => {
                let deadline = CancellationSignal::new();
                let guard = deadline.trigger_after(budget);
                (CancellationSignal::link([abort, &deadline]), Some(guard))
            }
        }
    }

    /// Handle a request, taking the deadline from `timeoutMs` or the
    /// configured default.
    pub async fn handle(&self, request: InboundRequest) -> GatewayResponse {
        let timeout = match request.query_parsed::<u64>(params::TIMEOUT_MS) {
            Ok(Some(0)) => {
                let error = GatewayError::logic("timeoutMs must be greater than zero");
                return self.handle_rejected(request, error);
            }
            Ok(Some(ms)) => Some(Duration::from_millis(ms)),
            Ok(None) => self.config.default_timeout(),
            Err(error) => return self.handle_rejected(request, error),
        };
        self.handle_with_timeout(request, timeout).await
    }

    /// Handle a request under an explicit deadline.
    pub async fn handle_with_timeout(
        &self,
        request: InboundRequest,
        timeout: Option<Duration>,
    ) -> GatewayResponse {
        let span = tracing::info_span!(
            "request",
            request_id = %request.request_id,
            endpoint = tracing::field::Empty
        );
        self.run(request, timeout).instrument(span).await
    }

    fn handle_rejected(&self, request: InboundRequest, error: GatewayError) -> GatewayResponse {
        let span = tracing::info_span!("request", request_id = %request.request_id);
        let _entered = span.enter();
        let metrics = MetricsCollector::new(request.request_id.clone());
        finish(request, metrics, Err(error.into()))
    }

    async fn run(&self, mut request: InboundRequest, timeout: Option<Duration>) -> GatewayResponse {
        request.timing.mark_phase(&LifecyclePhase::Start);
        let metrics = MetricsCollector::new(request.request_id.clone());

        let workload = match Workload::from_request(&request, &self.config) {
            Ok(workload) => workload,
            Err(error) => return finish(request, metrics, Err(error.into())),
        };
        tracing::Span::current().record("endpoint", workload.endpoint());
        let mut metrics = metrics.with_endpoint(workload.endpoint());

        let (signal, _deadline) = Self::derive_signal(request.abort_signal(), timeout);

        request.timing.mark_phase(&LifecyclePhase::Dispatched);
        let outcome = match workload {
            Workload::Forecast { days, delay } => {
                self.forecast(days, delay, &signal, &mut metrics).await
            }
            Workload::Quotes { targets, policy } => {
                self.quotes(&targets, policy, &signal, &mut metrics).await
            }
        };

        if let Some(source) = signal.triggering_source() {
            request
                .timing
                .mark_phase(&LifecyclePhase::Triggered(source.to_string()));
        }
        finish(request, metrics, outcome)
    }

    /// One provider call per day, in order, until done or cancelled.
    async fn forecast(
        &self,
        days: usize,
        delay: Duration,
        signal: &CancellationSignal,
        metrics: &mut MetricsCollector,
    ) -> Result<Value, Failure> {
        let caller = self.aggregator.caller().clone();
        let calls = Mutex::new(Vec::new());

        let report = CooperativeLoop::new(signal.clone())
            .run(1..=days, |_, day, signal| {
                let caller = caller.clone();
                let calls = &calls;
                async move {
                    let target = ProviderTarget::simulated(format!("forecast-day-{}", day), delay);
                    let start = Instant::now();
                    let outcome = caller.invoke(&target, &signal).await;
                    calls
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((target.id, outcome.label(), start.elapsed()));

                    match outcome {
                        CallOutcome::Succeeded(quote) => Ok(ForecastDay { day, quote }),
                        CallOutcome::Cancelled(source) => Err(GatewayError::Cancelled(source)),
                        CallOutcome::Failed(error) => Err(GatewayError::Upstream(error)),
                        CallOutcome::Pending => {
                            Err(GatewayError::logic("forecast call returned no outcome"))
                        }
                    }
                }
            })
            .await;

        for (target, outcome, elapsed) in calls.into_inner().unwrap_or_else(PoisonError::into_inner)
        {
            metrics.record_call(target, outcome, Some(elapsed));
        }
        metrics.record_loop_units(report.units_completed());

        let body = json!({
            "requested": days,
            "completed": report.units_completed(),
            "days": report.outputs,
        });
        match report.stop {
            LoopStop::Exhausted => Ok(body),
            LoopStop::Cancelled(source) => Err(Failure {
                error: source.into(),
                partial: Some(body),
            }),
            LoopStop::Failed(error) => Err(Failure {
                error,
                partial: Some(body),
            }),
        }
    }

    /// One provider call per target, all at once.
    async fn quotes(
        &self,
        targets: &[ProviderTarget],
        policy: AggregationPolicy,
        signal: &CancellationSignal,
        metrics: &mut MetricsCollector,
    ) -> Result<Value, Failure> {
        let result = self.aggregator.aggregate(targets, signal, policy).await?;

        for call in &result.calls {
            metrics.record_call(&call.target, call.outcome.label(), call.elapsed);
        }

        let quotes: Vec<Value> = result
            .calls
            .iter()
            .map(|call| {
                json!({
                    "provider": call.target,
                    "outcome": call.outcome.label(),
                    "quote": call.outcome.quote(),
                })
            })
            .collect();
        let body = json!({
            "policy": result.policy.as_str(),
            "status": result.status.as_str(),
            "succeeded": result.succeeded(),
            "failed": result.failed(),
            "cancelled": result.cancelled(),
            "not_awaited": result.not_awaited(),
            "quotes": quotes,
        });

        if result.status == AggregateStatus::ShortCircuited {
            let error = result
                .first_fault
                .unwrap_or_else(|| GatewayError::logic("short-circuit without a fault"));
            return Err(Failure {
                error,
                partial: Some(body),
            });
        }

        let required = self.config.min_successes.clamp(1, result.calls.len());
        if result.succeeded() >= required {
            return Ok(body);
        }

        // Too few successes: a trigger on the request signal explains them
        // better than whichever call happened to fail first.
        let error = match signal.triggering_source() {
            Some(source) => source.into(),
            None => result
                .first_fault
                .unwrap_or_else(|| GatewayError::logic("aggregation ended without a fault")),
        };
        Err(Failure {
            error,
            partial: Some(body),
        })
    }
}

fn finish(
    mut request: InboundRequest,
    metrics: MetricsCollector,
    outcome: Result<Value, Failure>,
) -> GatewayResponse {
    request.timing.mark_phase(&LifecyclePhase::Completion);

    let response = match outcome {
        Ok(body) => {
            GatewayResponse::ok(&request.request_id, body, metrics.finish(Classification::Ok))
        }
        Err(Failure { error, partial }) => {
            let metrics = metrics.finish(error.classification());
            GatewayResponse::error(&request.request_id, error, partial, metrics)
        }
    };

    events::request_classified(response.classification, request.timing.elapsed());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::CancelSource;

    fn orchestrator(config: GatewayConfig) -> RequestOrchestrator {
        RequestOrchestrator::from_config(config, CallCapability::Cancellable)
    }

    #[tokio::test(start_paused = true)]
    async fn test_derived_signal_follows_abort_and_deadline() {
        let abort = CancellationSignal::new();
        let (signal, guard) =
            RequestOrchestrator::derive_signal(&abort, Some(Duration::from_millis(300)));
        assert!(guard.is_some());

        assert_eq!(signal.triggered().await, CancelSource::Timeout);
        assert!(!abort.is_triggered());

        let abort = CancellationSignal::new();
        let (signal, guard) = RequestOrchestrator::derive_signal(&abort, None);
        assert!(guard.is_none());
        abort.cancel();
        assert_eq!(signal.triggering_source(), Some(CancelSource::Caller));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarmed_deadline_never_fires() {
        let abort = CancellationSignal::new();
        let (signal, guard) =
            RequestOrchestrator::derive_signal(&abort, Some(Duration::from_millis(300)));
        drop(guard);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(!signal.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_forecast_returns_every_day() {
        let (request, _abort) = InboundRequest::new("/forecast");
        let request = request.with_query("days", 3).with_query("delayMs", 100);

        let response = orchestrator(GatewayConfig::default()).handle(request).await;

        assert!(response.is_success());
        assert_eq!(response.body["completed"], 3);
        assert_eq!(response.body["days"][2]["day"], 3);
        assert_eq!(response.metrics.loop_units, Some(3));
        assert_eq!(response.metrics.calls.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_parameters_are_rejected() {
        let orchestrator = orchestrator(GatewayConfig::default());

        let (request, _abort) = InboundRequest::new("/quotes");
        let response = orchestrator
            .handle(request.with_query("timeoutMs", "soon"))
            .await;
        assert_eq!(response.classification, Classification::BadRequest);
        assert_eq!(response.status, 400);

        let (request, _abort) = InboundRequest::new("/quotes");
        let response = orchestrator.handle(request.with_query("timeoutMs", 0)).await;
        assert_eq!(response.classification, Classification::BadRequest);

        let (request, _abort) = InboundRequest::new("/quotes");
        let response = orchestrator
            .handle(request.with_query("providerCount", 0))
            .await;
        assert!(matches!(response.error, Some(GatewayError::Logic(_))));

        let (request, _abort) = InboundRequest::new("/quotes");
        let response = orchestrator
            .handle(request.with_query("providerCount", usize::MAX))
            .await;
        assert_eq!(response.status, 400);
        assert!(matches!(response.error, Some(GatewayError::Logic(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_successes_rejects_thin_partial_results() {
        let config = GatewayConfig::default().with_min_successes(2);
        let (request, _abort) = InboundRequest::new("/quotes");
        let request = request
            .with_query("delayMs", "100,200,300")
            .with_query("failAt", "1:50");

        let accepted = orchestrator(config.clone()).handle(request).await;
        assert!(accepted.is_success());
        assert_eq!(accepted.body["succeeded"], 2);
        assert_eq!(accepted.body["quotes"][0]["outcome"], "failed");

        let (request, _abort) = InboundRequest::new("/quotes");
        let request = request
            .with_query("delayMs", "100,200,300")
            .with_query("failAt", "1:50")
            .with_query("timeoutMs", 250);

        let rejected = orchestrator(config).handle(request).await;
        // One success before the deadline; the deadline explains the rest.
        assert_eq!(rejected.classification, Classification::DeadlineExceeded);
        assert_eq!(rejected.body["partial"]["succeeded"], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_timeout_from_config() {
        let config = GatewayConfig::default().with_default_timeout(Duration::from_millis(500));
        let (request, _abort) = InboundRequest::new("/quotes");
        let request = request.with_query("delayMs", 2000).with_query("providerCount", 1);

        let start = Instant::now();
        let response = orchestrator(config).handle(request).await;

        assert_eq!(response.error, Some(GatewayError::Cancelled(CancelSource::Timeout)));
        assert_eq!(response.status, 504);
        assert!(start.elapsed() < Duration::from_millis(600));
    }
}
