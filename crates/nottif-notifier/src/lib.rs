//! nottif-notifier: delivers rendered messages to the outbound webhook.
//!
//! A [`Notifier`] holds the live webhook URL and a [`Transport`]. Each call
//! to [`Notifier::send`] snapshots the URL, splits the message into at most
//! [`MAX_PARTS`] parts of [`MAX_CONTENT_LENGTH`] characters and POSTs them in
//! order. There is no retry; the first failure aborts the remaining parts.

pub mod payload;
pub mod split;
pub mod transport;

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use nottif_types::Identity;

pub use payload::WebhookPayload;
pub use transport::{ReqwestTransport, Transport};

/// Maximum characters per delivered part (webhook embed description limit).
pub const MAX_CONTENT_LENGTH: usize = 4096;
/// Maximum number of parts one message may be split into.
pub const MAX_PARTS: usize = 5;
/// The only response status treated as a successful delivery.
pub const SUCCESS_STATUS: u16 = 204;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook URL is not configured")]
    NotConfigured,
    #[error("message needs {parts} parts, at most {max} allowed")]
    MessageTooLarge { parts: usize, max: usize },
    #[error("webhook delivery failed: {0:#}")]
    Transport(anyhow::Error),
    #[error("webhook responded with status {0}")]
    UnexpectedStatus(u16),
}

/// Sends messages to the configured webhook.
pub struct Notifier {
    transport: Arc<dyn Transport>,
    webhook_url: RwLock<String>,
}

impl Notifier {
    pub fn new(webhook_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            webhook_url: RwLock::new(webhook_url.into()),
        }
    }

    /// Notifier using the default HTTP transport.
    pub fn with_reqwest(webhook_url: impl Into<String>) -> Self {
        Self::new(webhook_url, Arc::new(ReqwestTransport::new()))
    }

    pub async fn webhook_url(&self) -> String {
        self.webhook_url.read().await.clone()
    }

    /// Replace the target URL. Sends already in flight keep the URL they
    /// started with.
    pub async fn set_webhook_url(&self, url: impl Into<String>) {
        *self.webhook_url.write().await = url.into();
    }

    /// Deliver `message`, split into parts if needed.
    pub async fn send(&self, message: &str, identity: &Identity) -> Result<(), NotifyError> {
        let url = self.webhook_url().await;
        if url.is_empty() {
            return Err(NotifyError::NotConfigured);
        }

        let parts = split::part_count(message, MAX_CONTENT_LENGTH);
        if parts > MAX_PARTS {
            return Err(NotifyError::MessageTooLarge {
                parts,
                max: MAX_PARTS,
            });
        }

        let chunks = split::split_message(message, MAX_CONTENT_LENGTH);
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            let payload = WebhookPayload::render(chunk, identity, (i + 1, total), Utc::now());
            let status = self
                .transport
                .post(&url, &payload)
                .await
                .map_err(NotifyError::Transport)?;
            if status != SUCCESS_STATUS {
                return Err(NotifyError::UnexpectedStatus(status));
            }
            debug!(part = i + 1, total, "Webhook part delivered");
        }
        Ok(())
    }
}
