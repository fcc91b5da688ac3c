//! Real provider requests over HTTP.

use async_trait::async_trait;
use relay_core::{CancellationSignal, UpstreamError};

use crate::provider::{ProviderTarget, Quote};
use crate::transport::{Transport, TransportError};

/// HTTP transport for providers that expose `GET <address>?delayMs=<n>`.
///
/// Dropping the in-flight request future when the signal triggers closes
/// the connection, so cancellation reaches the transport level.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: None,
        }
    }

    /// Use a preconfigured client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Prepend `base_url` to relative target addresses.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Resolve a target address against the base URL.
    pub fn resolve(&self, address: &str) -> String {
        if address.starts_with("http://") || address.starts_with("https://") {
            return address.to_string();
        }
        match &self.base_url {
            Some(base) => format!("{}{}", base.trim_end_matches('/'), address),
            None => address.to_string(),
        }
    }

    async fn fetch(&self, url: String, target: &ProviderTarget) -> Result<Quote, UpstreamError> {
        let response = self
            .client
            .get(&url)
            .query(&[("delayMs", target.latency_ms)])
            .send()
            .await
            .map_err(|e| UpstreamError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                url,
            });
        }

        response
            .json::<Quote>()
            .await
            .map_err(|e| UpstreamError::Deserialization(e.to_string()))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        target: &ProviderTarget,
        signal: &CancellationSignal,
    ) -> Result<Quote, TransportError> {
        let url = self.resolve(&target.address);
        match signal.run_until_triggered(self.fetch(url, target)).await {
            Ok(result) => result.map_err(TransportError::Failed),
            Err(source) => Err(TransportError::Cancelled(source)),
        }
    }
}
