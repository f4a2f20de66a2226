//! Weighted majority vote over the classifier and the heuristics
//!
//! Each prediction adds `weight[source]` votes to its label. The label with
//! the most votes wins; on a tie the label backed by the source listed
//! earliest in `priority` wins (sources missing from the list rank last,
//! in declaration order). Ensemble confidence is the winner's vote share.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::config::EnsembleConfig;
use crate::models::{Category, Prediction, PredictionSource};

/// What happens to a classifier prediction below `min_confidence`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierGate {
    /// Drop it from the vote
    #[default]
    Exclude,
    /// Let it vote anyway
    Include,
}

#[derive(Debug, Clone)]
pub struct EnsembleVoter {
    weights: BTreeMap<PredictionSource, u32>,
    priority: Vec<PredictionSource>,
    gate: ClassifierGate,
    min_confidence: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    votes: u64,
    best_rank: usize,
}

impl EnsembleVoter {
    pub fn new(config: &EnsembleConfig, min_confidence: f64) -> Self {
        Self {
            weights: config.weights.as_map(),
            priority: config.priority.clone(),
            gate: config.classifier_gate,
            min_confidence,
        }
    }

    /// Whether the classifier prediction may take part in the vote
    pub fn admits(&self, classifier: &Prediction) -> bool {
        match self.gate {
            ClassifierGate::Include => true,
            ClassifierGate::Exclude => classifier.confidence >= self.min_confidence,
        }
    }

    fn rank(&self, source: PredictionSource) -> usize {
        self.priority
            .iter()
            .position(|&s| s == source)
            .unwrap_or(self.priority.len() + source as usize)
    }

    pub fn vote(
        &self,
        classifier: Option<&Prediction>,
        heuristics: &[Prediction],
    ) -> Option<Prediction> {
        let ballots = classifier
            .filter(|p| self.admits(p))
            .into_iter()
            .chain(heuristics.iter());

        let mut tally: BTreeMap<Category, Tally> = BTreeMap::new();
        let mut total = 0u64;
        for ballot in ballots {
            let weight = self.weights.get(&ballot.source).copied().unwrap_or(0);
            if weight == 0 {
                continue;
            }
            let rank = self.rank(ballot.source);
            let entry = tally.entry(ballot.label).or_insert(Tally {
                votes: 0,
                best_rank: usize::MAX,
            });
            entry.votes += u64::from(weight);
            entry.best_rank = entry.best_rank.min(rank);
            total += u64::from(weight);
        }

        let (label, winner) = tally
            .into_iter()
            .max_by_key(|(label, t)| (t.votes, Reverse(t.best_rank), Reverse(*label)))?;

        Some(Prediction::new(
            label,
            winner.votes as f64 / total as f64,
            PredictionSource::Ensemble,
        ))
    }
}
