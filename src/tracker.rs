//! Per-strategy hit counting
//!
//! A prediction set made after outcome `i` is scored against outcome `i + 1`
//! and nothing else. The tracker keeps at most one pending set and consumes
//! it when scoring, so no outcome is ever counted twice.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::models::{CategoryScheme, Outcome, PredictionSet, PredictionSource};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub correct: u64,
    pub total: u64,
}

impl Score {
    pub fn hit_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.correct as f64 / self.total as f64)
    }
}

pub type StrategyScoreboard = BTreeMap<PredictionSource, Score>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Hit or miss per source that had a prediction
    Scored(Vec<(PredictionSource, bool)>),
    NoPending,
    /// The set was not made right before this outcome; dropped unscored
    Stale { made_at: u64, outcome_index: u64 },
}

#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    scheme: CategoryScheme,
    scoreboard: StrategyScoreboard,
    pending: Option<PredictionSet>,
}

impl PerformanceTracker {
    pub fn new(scheme: CategoryScheme) -> Self {
        Self {
            scheme,
            scoreboard: StrategyScoreboard::new(),
            pending: None,
        }
    }

    /// Remember the set to score against the next outcome, replacing any
    /// earlier set made at the same or an older index.
    pub fn set_pending(&mut self, predictions: PredictionSet) {
        self.pending = Some(predictions);
    }

    pub fn pending(&self) -> Option<&PredictionSet> {
        self.pending.as_ref()
    }

    /// Score the pending set against a freshly appended outcome.
    pub fn evaluate_pending(&mut self, actual: &Outcome) -> Evaluation {
        match self.pending.take() {
            Some(set) => self.record_outcome(&set, actual),
            None => Evaluation::NoPending,
        }
    }

    /// Count one outcome against every source present in `predictions`.
    pub fn record_outcome(&mut self, predictions: &PredictionSet, actual: &Outcome) -> Evaluation {
        if predictions.made_at + 1 != actual.sequence_index {
            warn!(
                made_at = predictions.made_at,
                outcome_index = actual.sequence_index,
                "discarding stale prediction set"
            );
            return Evaluation::Stale {
                made_at: predictions.made_at,
                outcome_index: actual.sequence_index,
            };
        }

        let actual_cat = self.scheme.categorize(actual.value);
        let mut hits = Vec::with_capacity(predictions.predictions.len());
        for (source, prediction) in &predictions.predictions {
            let hit = prediction.label == actual_cat;
            let score = self.scoreboard.entry(*source).or_default();
            score.total += 1;
            if hit {
                score.correct += 1;
            }
            hits.push((*source, hit));
        }

        debug!(
            outcome_index = actual.sequence_index,
            sources = hits.len(),
            "scored prediction set"
        );
        Evaluation::Scored(hits)
    }

    pub fn scoreboard(&self) -> &StrategyScoreboard {
        &self.scoreboard
    }

    pub fn score(&self, source: PredictionSource) -> Score {
        self.scoreboard.get(&source).copied().unwrap_or_default()
    }

    /// Operator action: zero every counter. Pending predictions survive.
    pub fn reset(&mut self) {
        self.scoreboard.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::{HeuristicStrategy, HotGroup};
    use crate::models::{Category, Prediction};
    use crate::store::OutcomeStore;

    fn set(made_at: u64, labels: &[(PredictionSource, u8)]) -> PredictionSet {
        let mut s = PredictionSet::new(made_at);
        for (source, label) in labels {
            s.insert(Prediction::new(Category(*label), 1.0, *source));
        }
        s
    }

    #[test]
    fn test_hot_group_scenario() {
        let scheme = CategoryScheme::HighLow { threshold: 1 };
        let mut store = OutcomeStore::in_memory();
        for (i, v) in [1u32, 1, 1, 1, 2].iter().enumerate() {
            store.append(*v, &format!("g-{i}"));
        }

        let hot = HotGroup { window: 5 };
        let label = hot.predict(store.outcomes(), scheme).unwrap();
        assert_eq!(scheme.name(label), "low");

        let mut tracker = PerformanceTracker::new(scheme);
        let mut predictions = PredictionSet::new(store.last().unwrap().sequence_index);
        predictions.insert(Prediction::new(label, 1.0, PredictionSource::HotGroup));
        tracker.set_pending(predictions);

        store.append(1, "g-5");
        let eval = tracker.evaluate_pending(store.last().unwrap());
        assert_eq!(eval, Evaluation::Scored(vec![(PredictionSource::HotGroup, true)]));
        assert_eq!(
            tracker.score(PredictionSource::HotGroup),
            Score { correct: 1, total: 1 }
        );
    }

    #[test]
    fn test_each_outcome_counts_once() {
        let scheme = CategoryScheme::default();
        let mut store = OutcomeStore::in_memory();
        store.append(5, "a");
        let mut tracker = PerformanceTracker::new(scheme);
        tracker.set_pending(set(0, &[(PredictionSource::Trend, 1)]));

        store.append(6, "b");
        let outcome = store.last().unwrap().clone();
        assert!(matches!(tracker.evaluate_pending(&outcome), Evaluation::Scored(_)));
        assert_eq!(tracker.evaluate_pending(&outcome), Evaluation::NoPending);
        assert_eq!(tracker.score(PredictionSource::Trend).total, 1);
    }

    #[test]
    fn test_stale_set_is_not_scored() {
        let scheme = CategoryScheme::default();
        let mut store = OutcomeStore::in_memory();
        for (i, v) in [5u32, 6, 7].iter().enumerate() {
            store.append(*v, &format!("s-{i}"));
        }
        let mut tracker = PerformanceTracker::new(scheme);

        // made after outcome 0, but outcome 2 is the one being scored
        tracker.set_pending(set(0, &[(PredictionSource::Absent, 1)]));
        let eval = tracker.evaluate_pending(&store.outcomes()[2]);
        assert_eq!(
            eval,
            Evaluation::Stale {
                made_at: 0,
                outcome_index: 2
            }
        );
        // and never against the outcome it was computed from
        let eval = tracker.record_outcome(&set(2, &[(PredictionSource::Absent, 1)]), &store.outcomes()[2]);
        assert!(matches!(eval, Evaluation::Stale { .. }));
        assert!(tracker.scoreboard().is_empty());
    }

    #[test]
    fn test_counters_are_monotonic() {
        let scheme = CategoryScheme::default();
        let values = [3u32, 30, 4, 0, 22, 9, 9, 31];
        let mut store = OutcomeStore::in_memory();
        store.append(values[0], "v-0");
        let mut tracker = PerformanceTracker::new(scheme);

        for (i, v) in values.iter().enumerate().skip(1) {
            tracker.set_pending(set(
                (i - 1) as u64,
                &[(PredictionSource::HotGroup, 1), (PredictionSource::Ensemble, 2)],
            ));
            store.append(*v, &format!("v-{i}"));
            let before = tracker.scoreboard().clone();
            tracker.evaluate_pending(store.last().unwrap());

            for source in [PredictionSource::HotGroup, PredictionSource::Ensemble] {
                let now = tracker.score(source);
                let prev = before.get(&source).copied().unwrap_or_default();
                assert_eq!(now.total, prev.total + 1);
                assert!(now.correct <= now.total);
                assert!(now.correct >= prev.correct);
            }
        }
        assert_eq!(tracker.score(PredictionSource::HotGroup).total, 7);

        tracker.reset();
        assert_eq!(tracker.score(PredictionSource::HotGroup), Score::default());
    }
}
