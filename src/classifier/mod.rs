//! Category classifier
//!
//! Wraps the softmax learner with everything the engine needs around it:
//! building training rows from the history, class balancing, the label
//! encoder, and the untrained/fitted state machine. A refit builds the new
//! state on the side and swaps it in only once fitting succeeded, so the
//! previous model keeps serving until then.

pub mod retrain;
pub mod softmax;

pub use retrain::RetrainPolicy;
pub use softmax::{SoftmaxParams, SoftmaxRegression};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::config::ClassifierConfig;
use crate::features::FeatureBuilder;
use crate::models::{Category, Outcome, Prediction, PredictionSource};

/// Learned parameters plus the configuration they were fitted under
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub learner: SoftmaxRegression,
    /// Sorted category per class index
    pub classes: Vec<Category>,
    pub window_size: usize,
    pub min_confidence: f64,
    pub examples: usize,
    pub balanced_examples: usize,
    pub history_len: usize,
}

#[derive(Debug, Clone)]
pub enum ModelState {
    Untrained,
    Fitted(FittedModel),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredictOutcome {
    Predicted(Prediction),
    InsufficientData { have: usize, need: usize },
    Untrained,
    ShapeMismatch { expected: usize, actual: usize },
}

impl PredictOutcome {
    pub fn prediction(&self) -> Option<Prediction> {
        match self {
            PredictOutcome::Predicted(p) => Some(*p),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainReport {
    pub examples: usize,
    pub balanced_examples: usize,
    pub classes: usize,
}

pub struct ClassifierModel {
    builder: FeatureBuilder,
    config: ClassifierConfig,
    state: ModelState,
}

impl ClassifierModel {
    pub fn new(builder: FeatureBuilder, config: ClassifierConfig) -> Self {
        Self {
            builder,
            config,
            state: ModelState::Untrained,
        }
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self.state, ModelState::Fitted(_))
    }

    pub fn min_confidence(&self) -> f64 {
        self.config.min_confidence
    }

    /// Outcomes needed before a single training row exists
    pub fn min_history(&self) -> usize {
        self.builder.required_len(true)
    }

    /// Swap the feature configuration. The fitted model is kept, so the next
    /// prediction reports a shape mismatch until a refit happens. Feature
    /// settings are fixed for the life of a process, so only tests use this.
    #[cfg(test)]
    pub(crate) fn reconfigure_features(&mut self, features: &crate::config::FeatureConfig) {
        self.builder = FeatureBuilder::new(features, self.builder.scheme());
    }

    /// Full refit from the history. Leaves the current state untouched and
    /// returns None when there is nothing to learn from.
    pub fn train(&mut self, outcomes: &[Outcome]) -> Option<TrainReport> {
        let need = self.builder.required_len(true);
        if outcomes.len() < need {
            debug!(have = outcomes.len(), need, "not enough history to train");
            return None;
        }

        let scheme = self.builder.scheme();
        let mut rows = Vec::with_capacity(outcomes.len() + 1 - need);
        let mut targets = Vec::with_capacity(rows.capacity());
        for end in need..=outcomes.len() {
            let window = &outcomes[end - need..end];
            let Some(mut row) = self.builder.build(window, true) else {
                continue;
            };
            row.neutralize_label_block();
            rows.push(row.into_inner());
            targets.push(scheme.categorize(window[need - 1].value));
        }
        if rows.is_empty() {
            return None;
        }

        let classes: Vec<Category> = targets.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let mut labels: Vec<usize> = targets
            .iter()
            .map(|t| classes.binary_search(t).unwrap_or(0))
            .collect();
        let examples = rows.len();

        if self.config.balance_classes {
            balance_classes(&mut rows, &mut labels, classes.len(), self.config.seed);
        }

        let params = SoftmaxParams {
            epochs: self.config.epochs,
            learning_rate: self.config.learning_rate,
            l2: self.config.l2,
        };
        let learner = SoftmaxRegression::fit(&rows, &labels, classes.len(), params)?;

        let report = TrainReport {
            examples,
            balanced_examples: rows.len(),
            classes: classes.len(),
        };
        self.state = ModelState::Fitted(FittedModel {
            learner,
            classes,
            window_size: self.builder.window_size(),
            min_confidence: self.config.min_confidence,
            examples,
            balanced_examples: rows.len(),
            history_len: outcomes.len(),
        });

        info!(
            examples = report.examples,
            balanced = report.balanced_examples,
            classes = report.classes,
            "🧠 Classifier refitted"
        );
        Some(report)
    }

    /// Predict the category of the outcome after the last one in `outcomes`.
    pub fn predict(&self, outcomes: &[Outcome]) -> PredictOutcome {
        let ModelState::Fitted(model) = &self.state else {
            return PredictOutcome::Untrained;
        };
        let Some(row) = self.builder.build(outcomes, false) else {
            return PredictOutcome::InsufficientData {
                have: outcomes.len(),
                need: self.builder.required_len(false),
            };
        };
        let Some(probs) = model.learner.predict_proba(row.as_slice()) else {
            return PredictOutcome::ShapeMismatch {
                expected: model.learner.input_width(),
                actual: row.len(),
            };
        };

        let (best, confidence) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });

        match model.classes.get(best) {
            Some(&label) => PredictOutcome::Predicted(Prediction::new(
                label,
                confidence,
                PredictionSource::Classifier,
            )),
            None => PredictOutcome::ShapeMismatch {
                expected: model.classes.len(),
                actual: probs.len(),
            },
        }
    }
}

/// Oversample every minority class (with replacement) up to the majority count.
fn balance_classes(rows: &mut Vec<Vec<f64>>, labels: &mut Vec<usize>, n_classes: usize, seed: u64) {
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (i, &l) in labels.iter().enumerate() {
        by_class[l].push(i);
    }
    let majority = by_class.iter().map(Vec::len).max().unwrap_or(0);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for (class, members) in by_class.iter().enumerate() {
        if members.is_empty() {
            continue;
        }
        for _ in members.len()..majority {
            let pick = members[rng.gen_range(0..members.len())];
            rows.push(rows[pick].clone());
            labels.push(class);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureConfig;
    use crate::models::CategoryScheme;
    use crate::store::OutcomeStore;

    fn feature_config(window_size: usize) -> FeatureConfig {
        FeatureConfig {
            window_size,
            sub_windows: vec![2, 4],
            trend_k: 3,
        }
    }

    fn model(window_size: usize) -> ClassifierModel {
        let builder = FeatureBuilder::new(&feature_config(window_size), CategoryScheme::default());
        ClassifierModel::new(builder, ClassifierConfig::default())
    }

    fn store_with(values: &[u32]) -> OutcomeStore {
        let mut store = OutcomeStore::in_memory();
        for (i, v) in values.iter().enumerate() {
            store.append(*v, &format!("r-{i}"));
        }
        store
    }

    #[test]
    fn test_untrained_and_insufficient() {
        let mut m = model(4);
        let store = store_with(&[1, 2, 3]);
        assert_eq!(m.predict(store.outcomes()), PredictOutcome::Untrained);
        assert!(m.train(store.outcomes()).is_none());
        assert!(!m.is_fitted());

        let store = store_with(&[1, 20, 3, 22, 5, 24, 7, 26]);
        assert!(m.train(store.outcomes()).is_some());
        assert!(matches!(
            m.predict(&store.outcomes()[..3]),
            PredictOutcome::InsufficientData { have: 3, need: 4 }
        ));
    }

    #[test]
    fn test_learns_strict_alternation() {
        // low, high, low, high ... the next category is always the opposite
        let values: Vec<u32> = (0..80).map(|i| if i % 2 == 0 { 5 } else { 30 }).collect();
        let store = store_with(&values);
        let mut m = model(4);
        let report = m.train(store.outcomes()).unwrap();
        assert_eq!(report.classes, 2);
        assert_eq!(report.examples, 80 - 4);

        // last value is high (30) so the next one should be low
        let p = m.predict(store.outcomes()).prediction().unwrap();
        assert_eq!(p.label, Category(1));
        assert!(p.confidence > 0.5 && p.confidence <= 1.0);
        assert_eq!(p.source, PredictionSource::Classifier);
    }

    #[test]
    fn test_balancing_equalizes_class_counts() {
        let mut rows = vec![vec![0.0]; 5];
        let mut labels = vec![0, 0, 0, 0, 1];
        balance_classes(&mut rows, &mut labels, 2, 7);
        assert_eq!(labels.iter().filter(|&&l| l == 0).count(), 4);
        assert_eq!(labels.iter().filter(|&&l| l == 1).count(), 4);
        assert_eq!(rows.len(), labels.len());
    }

    #[test]
    fn test_shape_mismatch_after_reconfigure() {
        let values: Vec<u32> = (0..30).map(|i| (i * 11) % 37).collect();
        let store = store_with(&values);
        let mut m = model(4);
        m.train(store.outcomes()).unwrap();

        let mut wider = feature_config(4);
        wider.sub_windows.push(8);
        m.reconfigure_features(&wider);

        assert!(matches!(
            m.predict(store.outcomes()),
            PredictOutcome::ShapeMismatch { .. }
        ));
        assert!(m.is_fitted());

        m.train(store.outcomes()).unwrap();
        assert!(m.predict(store.outcomes()).prediction().is_some());
    }

    #[test]
    fn test_failed_train_keeps_previous_model() {
        let values: Vec<u32> = (0..30).map(|i| (i * 11) % 37).collect();
        let store = store_with(&values);
        let mut m = model(4);
        m.train(store.outcomes()).unwrap();
        let before = m.predict(store.outcomes());

        assert!(m.train(&store.outcomes()[..2]).is_none());
        assert_eq!(m.predict(store.outcomes()), before);
    }
}
