//! The outbound I/O boundary.

use async_trait::async_trait;
use relay_core::{CancelSource, CancellationSignal, UpstreamError};

use crate::provider::{ProviderTarget, Quote};

/// Error type for a single transport exchange.
///
/// Cancellation is never folded into `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Cancelled by {0}")]
    Cancelled(CancelSource),

    #[error(transparent)]
    Failed(#[from] UpstreamError),
}

/// Performs one request against a provider.
///
/// Implementations must suspend on I/O in a way that `signal` can
/// interrupt, returning `TransportError::Cancelled` once it triggers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and decode the quote.
    async fn send(
        &self,
        target: &ProviderTarget,
        signal: &CancellationSignal,
    ) -> Result<Quote, TransportError>;
}

/// In-process provider that waits out the target's configured latency.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedTransport;

impl SimulatedTransport {
    /// Create a new simulated transport.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn send(
        &self,
        target: &ProviderTarget,
        signal: &CancellationSignal,
    ) -> Result<Quote, TransportError> {
        match target.fail_at() {
            Some(at) => {
                signal.sleep(at).await.map_err(TransportError::Cancelled)?;
                Err(UpstreamError::Injected {
                    target: target.id.clone(),
                    reason: format!("injected failure after {}ms", at.as_millis()),
                }
                .into())
            }
            None => {
                signal
                    .sleep(target.latency())
                    .await
                    .map_err(TransportError::Cancelled)?;
                Ok(Quote::simulated(&target.id))
            }
        }
    }
}
