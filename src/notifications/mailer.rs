use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

/// A message handed to a mailer.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub html_body: String,
}

/// Delivery backend for queued notifications.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()>;
}

/// Writes emails to the log. Used when no relay is configured.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        info!(
            to = %email.to,
            subject = %email.subject,
            "Email delivered to log:\n{}",
            email.body
        );
        Ok(())
    }
}

/// Posts each email as JSON to an HTTP relay.
#[derive(Debug, Clone)]
pub struct RelayMailer {
    client: reqwest::Client,
    url: String,
}

impl RelayMailer {
    /// Each request, connect included, is abandoned after `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        let response = self.client.post(&self.url).json(email).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("relay responded with {}: {}", status, body);
        }
        Ok(())
    }
}
