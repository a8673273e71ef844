//! Notification sender that POSTs each summary as JSON to a fixed URL.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Handle;

use postbox_engine::NotificationSender;
use postbox_types::events::{MessageSummary, Notification};
use postbox_types::models::UserId;

pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
    runtime: Handle,
}

impl WebhookNotifier {
    /// `runtime` drives the HTTP calls; `notify` must be called from a
    /// thread outside it, such as the dispatcher worker.
    pub fn new(url: String, runtime: Handle) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build webhook client")?;
        Ok(Self { url, client, runtime })
    }
}

impl NotificationSender for WebhookNotifier {
    fn notify(&self, recipient: UserId, summary: &MessageSummary) -> Result<()> {
        let body = Notification {
            recipient,
            summary: summary.clone(),
        };
        self.runtime.block_on(async {
            self.client
                .post(&self.url)
                .json(&body)
                .send()
                .await
                .with_context(|| format!("POST {} failed", self.url))?
                .error_for_status()
                .context("Webhook rejected notification")?;
            Ok::<_, anyhow::Error>(())
        })
    }
}
