//! Fetch a forecast one day at a time.

use anyhow::Result;
use relay_gateway::{params, InboundRequest};

use super::{execute, ForecastArgs};
use crate::context::Context;

/// Run the forecast command.
pub async fn run(args: ForecastArgs, ctx: &Context) -> Result<bool> {
    let (mut request, abort) = InboundRequest::new("/forecast");

    if let Some(days) = args.days {
        request = request.with_query(params::DAYS, days);
    }
    if let Some(delay) = args.delay_ms {
        request = request.with_query(params::DELAY_MS, delay);
    }

    execute(ctx, request, abort, &args.request).await
}
