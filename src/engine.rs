//! One prediction cycle, end to end
//!
//! `EngineState` owns every stateful component. The host keeps it behind a
//! single async mutex so a cycle and a manual ingest never interleave, and
//! publishes an `EngineSnapshot` after each one for lock-free reads.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::alerts::{
    format_prediction, format_result, notifier_from_config, AlertDispatcher, AlertGate,
};
use crate::classifier::{ClassifierModel, ModelState, PredictOutcome, RetrainPolicy};
use crate::config::EngineConfig;
use crate::ensemble::EnsembleVoter;
use crate::features::FeatureBuilder;
use crate::feed::OutcomeSource;
use crate::heuristics::{strategy_set, HeuristicStrategy};
use crate::ingest::{prepare_batch, IngestReport};
use crate::models::{
    CategoryScheme, Outcome, Prediction, PredictionSet, PredictionSource, RawOutcome,
};
use crate::store::{open_backend, AppendResult, OutcomeStore};
use crate::tracker::{Evaluation, PerformanceTracker};

/// What happened to the record a cycle looked at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "index")]
pub enum Intake {
    NoData,
    /// Null or out-of-range value
    Rejected,
    Duplicate,
    Appended(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub intake: Intake,
    /// Hit or miss per source for the outcome just appended
    pub scored: Vec<(PredictionSource, bool)>,
    pub retrained: bool,
    pub predictions: Option<PredictionSet>,
    pub prediction_alert: bool,
    pub result_alert: bool,
}

impl CycleReport {
    fn new(intake: Intake) -> Self {
        Self {
            intake,
            scored: Vec::new(),
            retrained: false,
            predictions: None,
            prediction_alert: false,
            result_alert: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreView {
    pub correct: u64,
    pub total: u64,
    pub hit_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub fitted: bool,
    pub classes: Vec<String>,
    pub examples: usize,
    pub balanced_examples: usize,
    pub trained_on: usize,
}

/// Read-only view published after every cycle
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub scheme: CategoryScheme,
    pub history_len: usize,
    pub last_outcome: Option<Outcome>,
    pub predictions: Option<PredictionSet>,
    pub scoreboard: BTreeMap<PredictionSource, ScoreView>,
    pub model: ModelSummary,
    pub cycles: u64,
    pub persistence_pending: bool,
    pub updated_at: DateTime<Utc>,
}

pub struct EngineState {
    config: EngineConfig,
    scheme: CategoryScheme,
    store: OutcomeStore,
    classifier: ClassifierModel,
    retrain: RetrainPolicy,
    heuristics: Vec<Box<dyn HeuristicStrategy>>,
    voter: EnsembleVoter,
    tracker: PerformanceTracker,
    prediction_gate: AlertGate,
    result_gate: AlertGate,
    dispatcher: Option<AlertDispatcher>,
    latest: Option<PredictionSet>,
    fetch_timeout: Duration,
    cycles: u64,
}

impl EngineState {
    pub fn new(config: EngineConfig, store: OutcomeStore, dispatcher: Option<AlertDispatcher>) -> Self {
        let scheme = config.scheme;
        let builder = FeatureBuilder::new(&config.features, scheme);
        let classifier = ClassifierModel::new(builder, config.classifier.clone());

        // a loaded history long enough to train on is fitted at the first
        // cycle; a shorter one waits for the configured rule
        let mut retrain = RetrainPolicy::new(config.retrain, classifier.min_history());
        if store.len() >= classifier.min_history() {
            retrain.force();
        }

        Self {
            scheme,
            retrain,
            heuristics: strategy_set(&config.heuristics),
            voter: EnsembleVoter::new(&config.ensemble, config.classifier.min_confidence),
            tracker: PerformanceTracker::new(scheme),
            prediction_gate: AlertGate::new(config.alerts.repeat_threshold),
            result_gate: AlertGate::new(config.alerts.repeat_threshold),
            fetch_timeout: config.feed.timeout(),
            classifier,
            store,
            dispatcher,
            latest: None,
            cycles: 0,
            config,
        }
    }

    /// Open the configured store and notifier and build the engine on top.
    pub fn bootstrap(config: EngineConfig) -> Result<Self> {
        let backend = open_backend(&config.store)?;
        let store = OutcomeStore::open(backend)?;
        let (notifier, destination) = notifier_from_config(&config.alerts, reqwest::Client::new());
        info!(sink = notifier.name(), "🔔 Alert sink ready");
        let dispatcher = AlertDispatcher::new(notifier, destination);
        Ok(Self::new(config, store, Some(dispatcher)))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &OutcomeStore {
        &self.store
    }

    pub fn classifier(&self) -> &ClassifierModel {
        &self.classifier
    }

    pub fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }

    pub fn latest(&self) -> Option<&PredictionSet> {
        self.latest.as_ref()
    }

    /// Fetch at most one outcome and run the full pipeline. Never fails:
    /// a source error or timeout just means no new data this cycle.
    pub async fn run_cycle(&mut self, source: &dyn OutcomeSource) -> CycleReport {
        let raw = match tokio::time::timeout(self.fetch_timeout, source.fetch()).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(source = %source.describe(), error = %e, "outcome fetch failed");
                None
            }
            Err(_) => {
                warn!(
                    source = %source.describe(),
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "outcome fetch timed out"
                );
                None
            }
        };
        self.process(raw, true)
    }

    /// Push a batch of hand-entered values through the normal intake.
    /// Alerts go out once, for the state after the last value.
    pub fn ingest_manual(&mut self, values: &[i64]) -> Result<IngestReport> {
        let batch = prepare_batch(values, &self.config.ingest)?;
        let last = batch.len() - 1;
        let mut report = IngestReport::default();

        for (i, raw) in batch.into_iter().enumerate() {
            match self.process(Some(raw), i == last).intake {
                Intake::Appended(_) => report.accepted += 1,
                Intake::Duplicate => report.duplicates += 1,
                Intake::Rejected | Intake::NoData => report.rejected += 1,
            }
        }

        info!(
            accepted = report.accepted,
            rejected = report.rejected,
            duplicates = report.duplicates,
            "✍️ Manual batch ingested"
        );
        Ok(report)
    }

    fn process(&mut self, raw: Option<RawOutcome>, notify: bool) -> CycleReport {
        self.cycles += 1;
        let mut report = CycleReport::new(self.intake(raw));

        if let Intake::Appended(_) = report.intake {
            if let Some(outcome) = self.store.last().cloned() {
                self.score(&outcome, notify, &mut report);
            }
        }

        if self.store.is_dirty() {
            if let Err(e) = self.store.flush() {
                warn!(error = %e, "history still not persisted, retrying next cycle");
            }
        }

        report.retrained = self.maybe_retrain();

        if let Some(set) = self.predict_all() {
            self.tracker.set_pending(set.clone());
            if notify && self.prediction_gate.should_send(&set.signature()) {
                report.prediction_alert = self.dispatch(format_prediction(&set, self.scheme));
            }
            self.latest = Some(set.clone());
            report.predictions = Some(set);
        }

        debug!(cycle = self.cycles, intake = ?report.intake, "cycle complete");
        report
    }

    fn intake(&mut self, raw: Option<RawOutcome>) -> Intake {
        let Some(raw) = raw else {
            return Intake::NoData;
        };
        let Some(value) = self.config.feed.range.accept(raw.value) else {
            warn!(id = %raw.id, value = ?raw.value, "dropping invalid outcome");
            return Intake::Rejected;
        };
        match self.store.append(value, &raw.id) {
            AppendResult::Appended(index) => {
                info!(
                    index,
                    value,
                    category = self.scheme.name(self.scheme.categorize(value)),
                    "🎲 New outcome"
                );
                Intake::Appended(index)
            }
            AppendResult::Duplicate => Intake::Duplicate,
        }
    }

    fn score(&mut self, outcome: &Outcome, notify: bool, report: &mut CycleReport) {
        let Evaluation::Scored(hits) = self.tracker.evaluate_pending(outcome) else {
            return;
        };
        let ensemble_hit = hits
            .iter()
            .find(|(source, _)| *source == PredictionSource::Ensemble)
            .map(|(_, hit)| *hit);

        if notify {
            let verdict = match ensemble_hit {
                Some(true) => "green",
                Some(false) => "red",
                None => "none",
            };
            let signature = format!("{}:{}", outcome.external_id, verdict);
            if self.result_gate.should_send(&signature) {
                let text = format_result(outcome, self.scheme, ensemble_hit, self.tracker.scoreboard());
                report.result_alert = self.dispatch(text);
            }
        }
        report.scored = hits;
    }

    fn maybe_retrain(&mut self) -> bool {
        let outcomes = self.store.outcomes();
        if !self.retrain.should_retrain(outcomes) {
            return false;
        }
        let trained = self.classifier.train(outcomes).is_some();
        if !trained {
            warn!(history = outcomes.len(), "classifier refit produced no model");
        }
        // a failed fit is not retried until the rule fires again
        self.retrain.mark_trained(outcomes);
        trained
    }

    fn predict_all(&mut self) -> Option<PredictionSet> {
        let outcomes = self.store.outcomes();
        let made_at = outcomes.last()?.sequence_index;
        let mut set = PredictionSet::new(made_at);

        let classifier = match self.classifier.predict(outcomes) {
            PredictOutcome::Predicted(p) => Some(p),
            PredictOutcome::ShapeMismatch { expected, actual } => {
                warn!(expected, actual, "feature shape changed, forcing refit");
                self.retrain.force();
                None
            }
            PredictOutcome::InsufficientData { .. } | PredictOutcome::Untrained => None,
        };
        if let Some(p) = classifier {
            set.insert(p);
        }

        let heuristics: Vec<Prediction> = self
            .heuristics
            .iter()
            .filter_map(|h| {
                h.predict(outcomes, self.scheme)
                    .map(|label| Prediction::new(label, 1.0, h.source()))
            })
            .collect();
        for p in &heuristics {
            set.insert(*p);
        }

        if let Some(ensemble) = self.voter.vote(classifier.as_ref(), &heuristics) {
            set.insert(ensemble);
        }

        if set.is_empty() {
            return None;
        }
        Some(set)
    }

    fn dispatch(&self, text: String) -> bool {
        match &self.dispatcher {
            Some(dispatcher) => {
                dispatcher.dispatch(text);
                true
            }
            None => false,
        }
    }

    /// Operator action: zero the per-strategy counters.
    pub fn reset_scoreboard(&mut self) {
        self.tracker.reset();
        info!("🧹 Scoreboard reset");
    }

    /// Final persistence attempt before exit.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.store.is_dirty() {
            self.store.flush()?;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let scoreboard = self
            .tracker
            .scoreboard()
            .iter()
            .map(|(source, score)| {
                (
                    *source,
                    ScoreView {
                        correct: score.correct,
                        total: score.total,
                        hit_rate: score.hit_rate(),
                    },
                )
            })
            .collect();

        let model = match self.classifier.state() {
            ModelState::Untrained => ModelSummary {
                fitted: false,
                classes: Vec::new(),
                examples: 0,
                balanced_examples: 0,
                trained_on: 0,
            },
            ModelState::Fitted(m) => ModelSummary {
                fitted: true,
                classes: m
                    .classes
                    .iter()
                    .map(|c| self.scheme.name(*c).to_string())
                    .collect(),
                examples: m.examples,
                balanced_examples: m.balanced_examples,
                trained_on: m.history_len,
            },
        };

        EngineSnapshot {
            scheme: self.scheme,
            history_len: self.store.len(),
            last_outcome: self.store.last().cloned(),
            predictions: self.latest.clone(),
            scoreboard,
            model,
            cycles: self.cycles,
            persistence_pending: self.store.is_dirty(),
            updated_at: Utc::now(),
        }
    }
}
