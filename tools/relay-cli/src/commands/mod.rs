//! CLI command implementations.

pub mod config;
pub mod forecast;
pub mod quote;

use std::time::Duration;

use anyhow::Result;
use clap::{Args, Subcommand};
use relay_data::CallCapability;
use relay_gateway::{
    params, AggregationPolicy, ClientAbort, GatewayResponse, InboundRequest, RequestOrchestrator,
};

use crate::context::Context;
use crate::output::{classification_badge, format_millis, outcome_badge};

/// Options shared by every request command.
#[derive(Args)]
pub struct RequestArgs {
    /// Deadline for the whole request, in milliseconds.
    #[arg(short, long)]
    pub timeout_ms: Option<u64>,

    /// Simulate the client walking away after this many milliseconds.
    #[arg(long)]
    pub abort_after_ms: Option<u64>,

    /// Use the caller variant that never forwards cancellation.
    #[arg(long)]
    pub uncancellable: bool,
}

impl RequestArgs {
    fn capability(&self) -> CallCapability {
        if self.uncancellable {
            CallCapability::NonCancellable
        } else {
            CallCapability::Cancellable
        }
    }

    /// Carry `--timeout-ms` as the `timeoutMs` parameter so it goes through
    /// the same validation as any other request.
    fn apply(&self, request: InboundRequest) -> InboundRequest {
        match self.timeout_ms {
            Some(ms) => request.with_query(params::TIMEOUT_MS, ms),
            None => request,
        }
    }
}

/// Arguments for the quote command.
#[derive(Args)]
pub struct QuoteArgs {
    /// Provider latency in milliseconds, one value or a comma-separated list.
    #[arg(short, long)]
    pub delay_ms: Option<String>,

    /// Number of providers.
    #[arg(short, long)]
    pub providers: Option<usize>,

    /// Aggregation policy (fail-fast or best-effort).
    #[arg(long)]
    pub policy: Option<AggregationPolicy>,

    /// Make one provider fail: `<provider>:<ms>`, providers numbered from 1.
    #[arg(long)]
    pub fail_at: Option<String>,

    #[command(flatten)]
    pub request: RequestArgs,
}

/// Arguments for the forecast command.
#[derive(Args)]
pub struct ForecastArgs {
    /// Number of days.
    #[arg(long)]
    pub days: Option<usize>,

    /// Latency of each day's provider call, in milliseconds.
    #[arg(short, long)]
    pub delay_ms: Option<u64>,

    #[command(flatten)]
    pub request: RequestArgs,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,
    /// Initialize a new config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// Hand `request` to the orchestrator and report the response.
///
/// The client abort fires on Ctrl-C or after `--abort-after-ms`. Returns
/// whether the request succeeded.
async fn execute(
    ctx: &Context,
    request: InboundRequest,
    abort: ClientAbort,
    args: &RequestArgs,
) -> Result<bool> {
    let orchestrator =
        RequestOrchestrator::from_config(ctx.config.gateway.clone(), args.capability());
    ctx.output
        .debug(&format!("caller: {}, request: {}", args.capability(), request.request_id));

    let abort_after = args.abort_after_ms.map(Duration::from_millis);
    let watcher = tokio::spawn(async move {
        match abort_after {
            Some(after) => tokio::select! {
                _ = tokio::time::sleep(after) => {}
                _ = tokio::signal::ctrl_c() => {}
            },
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
        abort.abort();
    });

    let request = args.apply(request);
    let spinner = ctx.output.spinner(&format!("Waiting on {}", request.path));
    let response = orchestrator.handle(request).await;
    spinner.finish_and_clear();
    watcher.abort();

    report(ctx, &response);
    Ok(response.is_success())
}

fn report(ctx: &Context, response: &GatewayResponse) {
    if ctx.output.is_json() {
        ctx.output.json(response);
        return;
    }

    ctx.output.header("Response");
    ctx.output.kv("request", &response.request_id);
    ctx.output.kv("status", &classification_badge(response.classification));
    ctx.output
        .kv("duration", &format_millis(response.metrics.total_duration_ms));
    if let Some(units) = response.metrics.loop_units {
        ctx.output.kv("days completed", &units.to_string());
    }
    if let Some(error) = &response.error {
        ctx.output.kv("error", &error.to_string());
    }

    if !response.metrics.calls.is_empty() {
        print_calls(ctx, response);
    }

    if response.is_success() {
        ctx.output.success("Request completed");
    } else {
        ctx.output.warn(&format!("Request ended as {}", response.classification));
    }
}

fn print_calls(ctx: &Context, response: &GatewayResponse) {
    ctx.output.header("Calls");
    let widths = [18, 12, 10];
    ctx.output.table_row(&["TARGET", "OUTCOME", "DURATION"], &widths);
    for call in &response.metrics.calls {
        let duration = call
            .duration_ms
            .map(format_millis)
            .unwrap_or_else(|| "-".to_string());
        ctx.output.table_row(
            &[
                call.target.as_str(),
                outcome_badge(&call.outcome).as_str(),
                duration.as_str(),
            ],
            &widths,
        );
    }
}
