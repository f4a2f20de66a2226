//! Where new outcomes come from

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::models::RawOutcome;

/// Returns the most recent outcome the source knows about, if any.
/// Polling the same record twice is expected; the store drops repeats by id.
#[async_trait]
pub trait OutcomeSource: Send + Sync {
    async fn fetch(&self) -> Result<Option<RawOutcome>>;

    fn describe(&self) -> String;
}

/// Polls a JSON endpoint returning `{ "value": .., "id": .. }`.
pub struct HttpOutcomeSource {
    client: reqwest::Client,
    url: String,
}

impl HttpOutcomeSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("spinwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl OutcomeSource for HttpOutcomeSource {
    async fn fetch(&self) -> Result<Option<RawOutcome>> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", self.url))?;

        if resp.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        let body = resp.text().await.context("Failed to read feed body")?;
        if body.trim().is_empty() || body.trim() == "null" {
            return Ok(None);
        }

        let raw: RawOutcome =
            serde_json::from_str(&body).context("Feed returned malformed outcome")?;
        debug!(id = %raw.id, value = ?raw.value, "fetched outcome");
        Ok(Some(raw))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Feeds a fixed list of outcomes, one per fetch. Used for offline replays.
#[derive(Default)]
pub struct ReplayOutcomeSource {
    queue: Mutex<VecDeque<RawOutcome>>,
}

impl ReplayOutcomeSource {
    pub fn new(outcomes: impl IntoIterator<Item = RawOutcome>) -> Self {
        Self {
            queue: Mutex::new(outcomes.into_iter().collect()),
        }
    }

    /// Load a JSON array of `{ "value", "id" }` records.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        let outcomes: Vec<RawOutcome> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse replay file {}", path.display()))?;
        Ok(Self::new(outcomes))
    }

    pub fn push(&self, raw: RawOutcome) {
        self.queue.lock().push_back(raw);
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().len()
    }
}

#[async_trait]
impl OutcomeSource for ReplayOutcomeSource {
    async fn fetch(&self) -> Result<Option<RawOutcome>> {
        Ok(self.queue.lock().pop_front())
    }

    fn describe(&self) -> String {
        format!("replay ({} queued)", self.remaining())
    }
}
