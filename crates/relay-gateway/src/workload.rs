//! Work requested by an inbound request.

use std::time::Duration;

use relay_core::{GatewayError, InboundRequest};
use relay_data::ProviderTarget;
use relay_executor::AggregationPolicy;

use crate::config::GatewayConfig;

/// Query parameter names understood by the gateway.
pub mod params {
    pub const DELAY_MS: &str = "delayMs";
    pub const TIMEOUT_MS: &str = "timeoutMs";
    pub const DAYS: &str = "days";
    pub const PROVIDER_COUNT: &str = "providerCount";
    pub const POLICY: &str = "policy";
    pub const FAIL_AT: &str = "failAt";
}

/// What a request asks the gateway to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Workload {
    /// One provider call per day, strictly in order.
    Forecast { days: usize, delay: Duration },
    /// One provider call per target, all at once.
    Quotes {
        targets: Vec<ProviderTarget>,
        policy: AggregationPolicy,
    },
}

impl Workload {
    /// Endpoint name for logs and metrics.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Forecast { .. } => "forecast",
            Self::Quotes { .. } => "quotes",
        }
    }

    /// Parse the workload from the request path and query parameters.
    ///
    /// The last path segment selects the endpoint: `forecast` or `quotes`.
    pub fn from_request(
        request: &InboundRequest,
        config: &GatewayConfig,
    ) -> Result<Self, GatewayError> {
        let endpoint = request
            .path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();

        match endpoint {
            "forecast" => Self::forecast(request, config),
            "quotes" => Self::quotes(request, config),
            other => Err(GatewayError::logic(format!("unknown endpoint: '{}'", other))),
        }
    }

    fn forecast(request: &InboundRequest, config: &GatewayConfig) -> Result<Self, GatewayError> {
        let days = request
            .query_parsed::<usize>(params::DAYS)?
            .unwrap_or(config.default_days);
        if days == 0 || days > config.max_iterations {
            return Err(GatewayError::logic(format!(
                "days must be between 1 and {}",
                config.max_iterations
            )));
        }
        let delay = request
            .query_parsed::<u64>(params::DELAY_MS)?
            .unwrap_or(config.default_delay_ms);

        Ok(Self::Forecast {
            days,
            delay: Duration::from_millis(delay),
        })
    }

    fn quotes(request: &InboundRequest, config: &GatewayConfig) -> Result<Self, GatewayError> {
        let latencies = parse_latencies(request, config)?;
        check_provider_count(latencies.len(), config)?;

        let mut targets: Vec<ProviderTarget> = latencies
            .iter()
            .enumerate()
            .map(|(i, latency)| {
                ProviderTarget::simulated(format!("provider-{}", i + 1), Duration::from_millis(*latency))
            })
            .collect();

        if let Some(raw) = request.query_param(params::FAIL_AT) {
            let (index, at) = parse_fail_at(raw, targets.len())?;
            targets[index] = targets[index].clone().failing_at(at);
        }

        let policy = match request.query_param(params::POLICY) {
            Some(raw) => raw
                .parse()
                .map_err(|e: relay_executor::UnknownPolicy| GatewayError::logic(e.to_string()))?,
            None => config.policy,
        };

        Ok(Self::Quotes { targets, policy })
    }
}

/// `delayMs` is either one latency for `providerCount` providers or a
/// comma-separated latency per provider.
fn parse_latencies(
    request: &InboundRequest,
    config: &GatewayConfig,
) -> Result<Vec<u64>, GatewayError> {
    let count = request.query_parsed::<usize>(params::PROVIDER_COUNT)?;
    // Bound the count before it sizes any allocation.
    let repeat = check_provider_count(count.unwrap_or(config.default_provider_count), config)?;

    let Some(raw) = request.query_param(params::DELAY_MS) else {
        return Ok(vec![config.default_delay_ms; repeat]);
    };

    let latencies = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u64>()
                .map_err(|_| GatewayError::logic(format!("invalid value for 'delayMs': {}", raw)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    match (latencies.as_slice(), count) {
        ([single], _) => Ok(vec![*single; repeat]),
        (many, Some(n)) if n != many.len() => Err(GatewayError::logic(format!(
            "providerCount {} does not match {} delays",
            n,
            many.len()
        ))),
        (many, _) => Ok(many.to_vec()),
    }
}

fn check_provider_count(count: usize, config: &GatewayConfig) -> Result<usize, GatewayError> {
    if count == 0 || count > config.max_provider_count {
        return Err(GatewayError::logic(format!(
            "providerCount must be between 1 and {}",
            config.max_provider_count
        )));
    }
    Ok(count)
}

/// `failAt=<provider>:<ms>`, provider numbered from 1.
fn parse_fail_at(raw: &str, providers: usize) -> Result<(usize, Duration), GatewayError> {
    let invalid = || GatewayError::logic(format!("invalid value for 'failAt': {}", raw));
    let (provider, at) = raw.split_once(':').ok_or_else(invalid)?;
    let provider: usize = provider.trim().parse().map_err(|_| invalid())?;
    let at: u64 = at.trim().parse().map_err(|_| invalid())?;
    if provider == 0 || provider > providers {
        return Err(invalid());
    }
    Ok((provider - 1, Duration::from_millis(at)))
}
