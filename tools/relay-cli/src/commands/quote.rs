//! Fan out to several providers at once.

use anyhow::Result;
use relay_gateway::{params, InboundRequest};

use super::{execute, QuoteArgs};
use crate::context::Context;

/// Run the quote command.
pub async fn run(args: QuoteArgs, ctx: &Context) -> Result<bool> {
    let (mut request, abort) = InboundRequest::new("/quotes");

    if let Some(delay) = &args.delay_ms {
        request = request.with_query(params::DELAY_MS, delay);
    }
    if let Some(providers) = args.providers {
        request = request.with_query(params::PROVIDER_COUNT, providers);
    }
    if let Some(policy) = args.policy {
        request = request.with_query(params::POLICY, policy);
    }
    if let Some(fail_at) = &args.fail_at {
        request = request.with_query(params::FAIL_AT, fail_at);
    }

    execute(ctx, request, abort, &args.request).await
}
