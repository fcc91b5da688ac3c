//! End-to-end request scenarios on the paused Tokio clock.

use std::time::Duration;

use relay_core::UpstreamError;
use relay_data::CallCapability;
use relay_gateway::{
    CancelSource, Classification, ClientAbort, GatewayConfig, GatewayError, InboundRequest,
    RequestOrchestrator,
};
use tokio::time::Instant;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn gateway(capability: CallCapability) -> RequestOrchestrator {
    RequestOrchestrator::from_config(GatewayConfig::default(), capability)
}

fn abort_after(abort: ClientAbort, after: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        abort.abort();
    });
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_takes_the_slowest_call_not_the_sum() {
    let (request, _abort) = InboundRequest::new("/api/quotes");
    let request = request.with_query("delayMs", "1000,1500,2000");

    let start = Instant::now();
    let response = gateway(CallCapability::Cancellable).handle(request).await;
    let elapsed = start.elapsed();

    assert!(response.is_success());
    assert!(elapsed >= ms(2000) && elapsed < ms(2100), "{:?}", elapsed);
    let providers: Vec<_> = response.body["quotes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["provider"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(providers, ["provider-1", "provider-2", "provider-3"]);
    let first = response.metrics.calls[0].duration_ms.unwrap();
    assert!((1000..1100).contains(&first), "{}", first);
}

#[tokio::test(start_paused = true)]
async fn test_fail_fast_surfaces_first_failure() {
    let (request, _abort) = InboundRequest::new("/api/quotes");
    let request = request
        .with_query("delayMs", "2000,2000,2000")
        .with_query("failAt", "2:500")
        .with_query("policy", "fail-fast");

    let start = Instant::now();
    let response = gateway(CallCapability::Cancellable).handle(request).await;

    assert!(start.elapsed() < ms(600));
    assert_eq!(response.classification, Classification::UpstreamFailure);
    assert_eq!(response.status, 502);
    assert!(matches!(
        response.error,
        Some(GatewayError::Upstream(UpstreamError::Injected { ref target, .. })) if target == "provider-2"
    ));

    let partial = &response.body["partial"];
    assert_eq!(partial["status"], "short_circuited");
    assert_eq!(partial["quotes"][0]["outcome"], "not_awaited");
    assert_eq!(partial["quotes"][1]["outcome"], "failed");
    assert_eq!(partial["not_awaited"], 2);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_yields_timeout_classification() {
    let (request, _abort) = InboundRequest::new("/api/quotes");
    let request = request
        .with_query("delayMs", 5000)
        .with_query("providerCount", 1)
        .with_query("timeoutMs", 2000);

    let start = Instant::now();
    let response = gateway(CallCapability::Cancellable).handle(request).await;
    let elapsed = start.elapsed();

    assert_eq!(response.error, Some(GatewayError::Cancelled(CancelSource::Timeout)));
    assert_eq!(response.classification, Classification::DeadlineExceeded);
    assert_eq!(response.status, 504);
    assert!(elapsed >= ms(2000) && elapsed < ms(2100), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_client_abort_yields_client_closed_classification() {
    let (request, abort) = InboundRequest::new("/api/quotes");
    let request = request.with_query("delayMs", 5000).with_query("providerCount", 1);
    abort_after(abort, ms(1000));

    let start = Instant::now();
    let response = gateway(CallCapability::Cancellable).handle(request).await;

    assert_eq!(response.error, Some(GatewayError::Cancelled(CancelSource::Caller)));
    assert_eq!(response.classification, Classification::ClientClosedRequest);
    assert_eq!(response.status, 499);
    assert!(start.elapsed() < ms(1100));
}

#[tokio::test(start_paused = true)]
async fn test_forecast_stops_after_three_days_when_client_leaves() {
    let (request, abort) = InboundRequest::new("/api/forecast");
    let request = request.with_query("days", 10).with_query("delayMs", 200);
    abort_after(abort, ms(650));

    let response = gateway(CallCapability::Cancellable).handle(request).await;

    assert_eq!(response.classification, Classification::ClientClosedRequest);
    assert_eq!(response.body["partial"]["completed"], 3);
    assert_eq!(response.body["partial"]["requested"], 10);
    assert_eq!(response.metrics.loop_units, Some(3));
    // The fourth call started and was cancelled; nothing after it ran.
    assert_eq!(response.metrics.calls.len(), 4);
    assert_eq!(response.metrics.calls[3].outcome, "cancelled");
}

#[tokio::test(start_paused = true)]
async fn test_uncancellable_calls_outlive_the_deadline() {
    let (request, _abort) = InboundRequest::new("/api/quotes");
    let request = request
        .with_query("delayMs", 5000)
        .with_query("providerCount", 1)
        .with_query("timeoutMs", 2000);

    let start = Instant::now();
    let response = gateway(CallCapability::NonCancellable).handle(request).await;

    // The deadline fired at 2000ms, but the call never saw it.
    assert!(start.elapsed() >= ms(5000));
    assert!(response.is_success());
    assert_eq!(response.body["quotes"][0]["outcome"], "succeeded");
}

#[tokio::test(start_paused = true)]
async fn test_uncancellable_forecast_finishes_the_day_in_flight() {
    let (request, abort) = InboundRequest::new("/api/forecast");
    let request = request.with_query("days", 10).with_query("delayMs", 200);
    abort_after(abort, ms(650));

    let start = Instant::now();
    let response = gateway(CallCapability::NonCancellable).handle(request).await;

    assert_eq!(response.classification, Classification::ClientClosedRequest);
    assert_eq!(response.body["partial"]["completed"], 4);
    assert!(start.elapsed() >= ms(800));
    assert!(response
        .metrics
        .calls
        .iter()
        .all(|call| call.outcome == "succeeded"));
}
