use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AlertConfig;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// A chat or webhook sink that accepts plain text for a destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, destination: &str, text: &str) -> Result<()>;
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
}

impl TelegramNotifier {
    pub fn new(client: reqwest::Client, bot_token: String) -> Self {
        Self { client, bot_token }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, destination: &str, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API_BASE, self.bot_token);
        self.client
            .post(&url)
            .json(&json!({ "chat_id": destination, "text": text }))
            .send()
            .await
            .context("Telegram request failed")?
            .error_for_status()
            .context("Telegram rejected message")?;
        Ok(())
    }
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, destination: &str, text: &str) -> Result<()> {
        self.client
            .post(&self.url)
            .json(&json!({ "destination": destination, "text": text }))
            .send()
            .await
            .context("Webhook request failed")?
            .error_for_status()
            .context("Webhook rejected message")?;
        Ok(())
    }
}

/// Writes alerts to the log only
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, destination: &str, text: &str) -> Result<()> {
        info!(destination, "📣 {}", text);
        Ok(())
    }
}

/// Pick the sink from config: Telegram when fully configured, then a
/// webhook, else log-only. Returns the notifier and its destination id.
pub fn notifier_from_config(
    config: &AlertConfig,
    client: reqwest::Client,
) -> (Arc<dyn Notifier>, String) {
    if let (Some(token), Some(chat)) = (&config.telegram_bot_token, &config.telegram_chat_id) {
        return (
            Arc::new(TelegramNotifier::new(client, token.clone())),
            chat.clone(),
        );
    }
    if let Some(url) = &config.webhook_url {
        return (
            Arc::new(WebhookNotifier::new(client, url.clone())),
            "webhook".to_string(),
        );
    }
    (Arc::new(LogNotifier), "log".to_string())
}

/// Fire-and-forget delivery. Sending never blocks the caller and failures
/// are only logged.
#[derive(Clone)]
pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    destination: String,
}

impl AlertDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, destination: String) -> Self {
        Self {
            notifier,
            destination,
        }
    }

    pub fn log_only() -> Self {
        Self::new(Arc::new(LogNotifier), "log".to_string())
    }

    pub fn dispatch(&self, text: String) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(sink = self.notifier.name(), "no async runtime, alert dropped");
            return;
        };
        let notifier = self.notifier.clone();
        let destination = self.destination.clone();
        handle.spawn(async move {
            if let Err(e) = notifier.send(&destination, &text).await {
                warn!(sink = notifier.name(), error = %e, "failed to deliver alert");
            }
        });
    }
}
