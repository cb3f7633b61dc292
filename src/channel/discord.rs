use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use super::MessageSink;
use crate::models::parse_http_url;
use crate::utils::error::{AppError, Result};

const EMBED_COLOR: u32 = 0x00ff00;
const USERNAME: &str = "Price Watch";

/// Outbound-only sink posting to a Discord webhook.
///
/// The target owner is shown as the embed author, so every owner's alerts can
/// share one webhook.
#[derive(Debug, Clone)]
pub struct DiscordWebhook {
    client: Client,
    webhook_url: String,
}

impl DiscordWebhook {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self> {
        let webhook_url = webhook_url.into();
        parse_http_url(&webhook_url)
            .map_err(|_| AppError::Config(format!("invalid Discord webhook URL '{}'", webhook_url)))?;

        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self { client, webhook_url })
    }

    fn create_payload(&self, target: &str, text: &str) -> serde_json::Value {
        let (title, description) = match text.split_once('\n') {
            Some((first, rest)) => (first, rest),
            None => (text, ""),
        };

        json!({
            "username": USERNAME,
            "embeds": [{
                "title": title,
                "description": description,
                "color": EMBED_COLOR,
                "author": { "name": target },
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "footer": { "text": USERNAME },
            }]
        })
    }
}

#[async_trait]
impl MessageSink for DiscordWebhook {
    async fn send(&self, target: &str, text: &str) -> Result<()> {
        let payload = self.create_payload(target, text);
        let response = self.client.post(&self.webhook_url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Delivery(format!("Discord webhook returned {}: {}", status, body)));
        }

        tracing::debug!("Delivered message for {} to Discord", target);
        Ok(())
    }
}
