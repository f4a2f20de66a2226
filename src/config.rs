//! Engine configuration
//!
//! Every field has a default so an empty TOML file is a valid config.
//! A handful of deployment-specific values can be overridden from the
//! environment (after `.env` is loaded).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{env, path::Path, time::Duration};

use crate::ensemble::ClassifierGate;
use crate::models::{CategoryScheme, PredictionSource, ValueRange};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheme: CategoryScheme,
    pub feed: FeedConfig,
    pub store: StoreConfig,
    pub features: FeatureConfig,
    pub classifier: ClassifierConfig,
    pub retrain: RetrainConfig,
    pub heuristics: HeuristicConfig,
    pub ensemble: EnsembleConfig,
    pub alerts: AlertConfig,
    pub ingest: IngestConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Endpoint returning the latest outcome as JSON. No URL means manual-only.
    pub url: Option<String>,
    pub poll_interval_secs: u64,
    pub timeout_ms: u64,
    pub range: ValueRange,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: None,
            poll_interval_secs: 10,
            timeout_ms: 5_000,
            range: ValueRange::default(),
        }
    }
}

impl FeedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendKind {
    Sqlite,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackendKind,
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::Sqlite,
            path: "spinwatch_history.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub window_size: usize,
    /// Trailing sub-window lengths for the rolling frequency features
    pub sub_windows: Vec<usize>,
    /// Number of raw values the short-term trend looks at
    pub trend_k: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            sub_windows: vec![5, 10, 20, 30, 50],
            trend_k: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub min_confidence: f64,
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
    pub balance_classes: bool,
    pub seed: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.45,
            epochs: 300,
            learning_rate: 0.5,
            l2: 1e-3,
            balance_classes: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetrainConfig {
    /// Refit whenever the history length reaches a multiple of `n`
    EveryN { n: usize },
    /// Refit whenever the trailing `tail` outcomes hash differently
    ContentHash { tail: usize },
}

impl Default for RetrainConfig {
    fn default() -> Self {
        RetrainConfig::EveryN { n: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    pub hot_window: usize,
    pub trend_window: usize,
    pub alternation_limit: usize,
    pub absent_window: usize,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            hot_window: 12,
            trend_window: 5,
            alternation_limit: 3,
            absent_window: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub weights: SourceWeights,
    /// Tie-break order, first wins
    pub priority: Vec<PredictionSource>,
    pub classifier_gate: ClassifierGate,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            weights: SourceWeights::default(),
            priority: vec![
                PredictionSource::Classifier,
                PredictionSource::HotGroup,
                PredictionSource::Trend,
                PredictionSource::Alternation,
                PredictionSource::Absent,
            ],
            classifier_gate: ClassifierGate::Exclude,
        }
    }
}

/// Votes each source casts in the ensemble. Zero disables a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceWeights {
    pub classifier: u32,
    pub hot_group: u32,
    pub trend: u32,
    pub alternation: u32,
    pub absent: u32,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            classifier: 2,
            hot_group: 1,
            trend: 1,
            alternation: 1,
            absent: 1,
        }
    }
}

impl SourceWeights {
    pub fn as_map(&self) -> BTreeMap<PredictionSource, u32> {
        BTreeMap::from([
            (PredictionSource::Classifier, self.classifier),
            (PredictionSource::HotGroup, self.hot_group),
            (PredictionSource::Trend, self.trend),
            (PredictionSource::Alternation, self.alternation),
            (PredictionSource::Absent, self.absent),
        ])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Identical prediction alerts are re-sent after this many suppressed repeats
    pub repeat_threshold: u32,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub webhook_url: Option<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            repeat_threshold: 3,
            telegram_bot_token: None,
            telegram_chat_id: None,
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub max_batch: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { max_batch: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config at {}", path.display()))?;
                Self::from_toml(&content)
                    .with_context(|| format!("Failed to parse config at {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(url) = non_empty_env("SPINWATCH_FEED_URL") {
            self.feed.url = Some(url);
        }
        if let Some(path) = non_empty_env("SPINWATCH_DB_PATH") {
            self.store.path = path;
        }
        if let Some(bind) = non_empty_env("SPINWATCH_API_BIND") {
            self.api.bind = bind;
        }
        if let Some(token) = non_empty_env("TELEGRAM_BOT_TOKEN") {
            self.alerts.telegram_bot_token = Some(token);
        }
        if let Some(chat) = non_empty_env("TELEGRAM_CHAT_ID") {
            self.alerts.telegram_chat_id = Some(chat);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.features.window_size < 4 {
            bail!(
                "features.window_size must be at least 4 (got {})",
                self.features.window_size
            );
        }
        if self.features.sub_windows.iter().any(|&w| w == 0) {
            bail!("features.sub_windows must not contain 0");
        }
        if self.features.trend_k < 2 {
            bail!("features.trend_k must be at least 2");
        }
        if !(0.0..=1.0).contains(&self.classifier.min_confidence) {
            bail!("classifier.min_confidence must be within [0, 1]");
        }
        if self.feed.range.min > self.feed.range.max {
            bail!("feed.range.min must not exceed feed.range.max");
        }
        match self.retrain {
            RetrainConfig::EveryN { n: 0 } => bail!("retrain.n must be positive"),
            RetrainConfig::ContentHash { tail: 0 } => bail!("retrain.tail must be positive"),
            _ => {}
        }
        if self.heuristics.hot_window == 0 {
            bail!("heuristics.hot_window must be positive");
        }
        if self.heuristics.absent_window == 0 {
            bail!("heuristics.absent_window must be positive");
        }
        if self.heuristics.alternation_limit == 0 {
            bail!("heuristics.alternation_limit must be positive");
        }
        if self.ingest.max_batch == 0 {
            bail!("ingest.max_batch must be positive");
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
