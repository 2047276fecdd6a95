//! HTTP transport for webhook deliveries.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;

use crate::payload::WebhookPayload;

/// Timeout applied to each outbound POST.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// POSTs a payload and reports the response status.
///
/// Only transport-level failures are errors here; status interpretation is
/// left to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, url: &str, payload: &WebhookPayload) -> anyhow::Result<u16>;
}

/// [`Transport`] backed by a shared `reqwest` client.
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post(&self, url: &str, payload: &WebhookPayload) -> anyhow::Result<u16> {
        let resp = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .context("webhook request failed")?;
        Ok(resp.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nottif_types::Identity;

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let transport = ReqwestTransport::with_timeout(Duration::from_secs(2));
        let payload = WebhookPayload::render("x", &Identity::default(), (1, 1), Utc::now());
        // Port 9 on localhost (discard) is closed in test environments.
        let result = transport.post("http://127.0.0.1:9/webhook", &payload).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_url_is_transport_error() {
        let transport = ReqwestTransport::new();
        let payload = WebhookPayload::render("x", &Identity::default(), (1, 1), Utc::now());
        assert!(transport.post("not a url", &payload).await.is_err());
    }
}
