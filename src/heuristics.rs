//! Rule-based predictors
//!
//! Each strategy is a pure function of the history and its own parameters.
//! They share nothing, and return None until the history is long enough.

use crate::config::HeuristicConfig;
use crate::features::trend_sign;
use crate::models::{Category, CategoryScheme, Outcome, PredictionSource};

pub trait HeuristicStrategy: Send + Sync {
    fn source(&self) -> PredictionSource;

    /// Fewest outcomes `predict` will work with
    fn min_history(&self) -> usize;

    fn predict(&self, outcomes: &[Outcome], scheme: CategoryScheme) -> Option<Category>;
}

/// The configured strategy set, in tie-break-neutral order.
pub fn strategy_set(config: &HeuristicConfig) -> Vec<Box<dyn HeuristicStrategy>> {
    vec![
        Box::new(HotGroup {
            window: config.hot_window,
        }),
        Box::new(Trend {
            window: config.trend_window,
        }),
        Box::new(Alternation {
            limit: config.alternation_limit,
        }),
        Box::new(Absent {
            window: config.absent_window,
        }),
    ]
}

fn trailing(outcomes: &[Outcome], n: usize) -> Option<&[Outcome]> {
    if n == 0 || outcomes.len() < n {
        return None;
    }
    Some(&outcomes[outcomes.len() - n..])
}

/// Highest non-zero bucket of a scheme
fn top_bucket(scheme: CategoryScheme) -> u8 {
    (scheme.count() - 1) as u8
}

/// Most frequent category among the trailing non-zero outcomes.
/// Ties go to whichever category showed up first in the window.
#[derive(Debug, Clone)]
pub struct HotGroup {
    pub window: usize,
}

impl HeuristicStrategy for HotGroup {
    fn source(&self) -> PredictionSource {
        PredictionSource::HotGroup
    }

    fn min_history(&self) -> usize {
        self.window
    }

    fn predict(&self, outcomes: &[Outcome], scheme: CategoryScheme) -> Option<Category> {
        let window = trailing(outcomes, self.window)?;

        let mut counts: Vec<(Category, usize)> = Vec::new();
        for o in window.iter().filter(|o| o.value > 0) {
            let cat = scheme.categorize(o.value);
            match counts.iter_mut().find(|(c, _)| *c == cat) {
                Some((_, n)) => *n += 1,
                None => counts.push((cat, 1)),
            }
        }

        let mut best: Option<(Category, usize)> = None;
        for (cat, n) in counts {
            if best.map_or(true, |(_, b)| n > b) {
                best = Some((cat, n));
            }
        }
        best.map(|(cat, _)| cat)
    }
}

/// Follow the short-term direction of the raw values by one bucket.
#[derive(Debug, Clone)]
pub struct Trend {
    pub window: usize,
}

impl HeuristicStrategy for Trend {
    fn source(&self) -> PredictionSource {
        PredictionSource::Trend
    }

    fn min_history(&self) -> usize {
        self.window.max(2)
    }

    fn predict(&self, outcomes: &[Outcome], scheme: CategoryScheme) -> Option<Category> {
        let window = trailing(outcomes, self.min_history())?;
        let values: Vec<f64> = window.iter().map(|o| o.value as f64).collect();
        let last = scheme.categorize(window[window.len() - 1].value);

        // zero has no place on the scale; shift from the lowest bucket
        let base = if last.is_zero() { 1 } else { last.0 as i32 };
        let sign = trend_sign(&values, values.len());
        let shifted = (base + sign as i32).clamp(1, top_bucket(scheme) as i32);
        Some(Category(shifted as u8))
    }
}

/// After `limit` identical categories in a row, bet on a change.
#[derive(Debug, Clone)]
pub struct Alternation {
    pub limit: usize,
}

impl HeuristicStrategy for Alternation {
    fn source(&self) -> PredictionSource {
        PredictionSource::Alternation
    }

    fn min_history(&self) -> usize {
        self.limit
    }

    fn predict(&self, outcomes: &[Outcome], scheme: CategoryScheme) -> Option<Category> {
        let window = trailing(outcomes, self.limit)?;
        let last = scheme.categorize(window[window.len() - 1].value);
        let all_same = window.iter().all(|o| scheme.categorize(o.value) == last);
        let top = top_bucket(scheme);
        if last.is_zero() {
            return Some(Category(1.min(top)));
        }
        if !all_same {
            return Some(last);
        }
        Some(Category(last.0 % top + 1))
    }
}

/// The non-zero category seen least often in the trailing window.
/// Ties go to the lowest bucket.
#[derive(Debug, Clone)]
pub struct Absent {
    pub window: usize,
}

impl HeuristicStrategy for Absent {
    fn source(&self) -> PredictionSource {
        PredictionSource::Absent
    }

    fn min_history(&self) -> usize {
        self.window
    }

    fn predict(&self, outcomes: &[Outcome], scheme: CategoryScheme) -> Option<Category> {
        let window = trailing(outcomes, self.window)?;
        scheme.non_zero().min_by_key(|&cat| {
            window
                .iter()
                .filter(|o| scheme.categorize(o.value) == cat)
                .count()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::OutcomeStore;

    const LOW: Category = Category(1);
    const HIGH: Category = Category(2);

    fn history(values: &[u32]) -> Vec<Outcome> {
        let mut store = OutcomeStore::in_memory();
        for (i, v) in values.iter().enumerate() {
            store.append(*v, &format!("h-{i}"));
        }
        store.outcomes().to_vec()
    }

    fn split_at_one() -> CategoryScheme {
        CategoryScheme::HighLow { threshold: 1 }
    }

    #[test]
    fn test_hot_group_majority() {
        let hot = HotGroup { window: 5 };
        let h = history(&[1, 1, 1, 1, 2]);
        assert_eq!(hot.predict(&h, split_at_one()), Some(LOW));
        assert_eq!(hot.predict(&h[..4], split_at_one()), None);
    }

    #[test]
    fn test_hot_group_ignores_zero_and_breaks_ties_by_first_seen() {
        let hot = HotGroup { window: 6 };
        let scheme = CategoryScheme::default();
        // zeros would win if counted
        let h = history(&[30, 0, 0, 0, 5, 31]);
        assert_eq!(hot.predict(&h, scheme), Some(HIGH));

        // two lows, two highs: low appeared first
        let h = history(&[0, 4, 25, 26, 7, 0]);
        assert_eq!(hot.predict(&h, scheme), Some(LOW));

        let h = history(&[0, 0, 0, 0, 0, 0]);
        assert_eq!(hot.predict(&h, scheme), None);
    }

    #[test]
    fn test_trend_shifts_by_one_bucket() {
        let trend = Trend { window: 5 };
        let dozens = CategoryScheme::Dozen;

        // rising, last in the 2nd dozen -> 3rd dozen
        let h = history(&[2, 5, 9, 12, 15]);
        assert_eq!(trend.predict(&h, dozens), Some(Category(3)));

        // rising but already in the 3rd dozen -> stays
        let h = history(&[20, 25, 28, 30, 36]);
        assert_eq!(trend.predict(&h, dozens), Some(Category(3)));

        // falling from the 1st dozen is clamped at the 1st dozen
        let h = history(&[30, 20, 10, 6, 3]);
        assert_eq!(trend.predict(&h, dozens), Some(Category(1)));

        // flat repeats
        let h = history(&[14, 14, 14, 14, 14]);
        assert_eq!(trend.predict(&h, dozens), Some(Category(2)));

        assert_eq!(trend.predict(&h[..4], dozens), None);
    }

    #[test]
    fn test_alternation_switches_after_limit() {
        let alt = Alternation { limit: 3 };
        let scheme = CategoryScheme::default();

        assert_eq!(alt.predict(&history(&[3, 5, 7]), scheme), Some(HIGH));
        assert_eq!(alt.predict(&history(&[20, 25, 30]), scheme), Some(LOW));
        assert_eq!(alt.predict(&history(&[20, 5, 30]), scheme), Some(HIGH));
        assert_eq!(alt.predict(&history(&[0, 0, 0]), scheme), Some(LOW));
        assert_eq!(alt.predict(&history(&[3, 5]), scheme), None);

        let dozens = CategoryScheme::Dozen;
        assert_eq!(alt.predict(&history(&[30, 31, 32]), dozens), Some(Category(1)));
    }

    #[test]
    fn test_zero_last_outcome_never_predicts_zero() {
        let scheme = CategoryScheme::default();
        let alt = Alternation { limit: 3 };
        assert_eq!(alt.predict(&history(&[5, 20, 0]), scheme), Some(LOW));

        let trend = Trend { window: 3 };
        assert_eq!(trend.predict(&history(&[0, 0, 0]), scheme), Some(LOW));
        // falling into zero clamps at the lowest bucket
        assert_eq!(trend.predict(&history(&[30, 10, 0]), scheme), Some(LOW));
        // rising out of zero moves up from the bucket it reached
        assert_eq!(trend.predict(&history(&[0, 0, 3]), CategoryScheme::Dozen), Some(Category(2)));

        let absent = Absent { window: 3 };
        assert_eq!(absent.predict(&history(&[0, 0, 0]), scheme), Some(LOW));
    }

    #[test]
    fn test_absent_prefers_missing_category() {
        let absent = Absent { window: 6 };
        let h = history(&[1, 2, 13, 14, 15, 3]);
        assert_eq!(absent.predict(&h, CategoryScheme::Dozen), Some(Category(3)));

        // every dozen seen twice -> lowest bucket
        let h = history(&[1, 2, 13, 14, 25, 26]);
        assert_eq!(absent.predict(&h, CategoryScheme::Dozen), Some(Category(1)));

        assert_eq!(absent.predict(&h[..5], CategoryScheme::Dozen), None);
    }

    #[test]
    fn test_strategy_set_covers_every_heuristic() {
        let set = strategy_set(&HeuristicConfig::default());
        let sources: Vec<PredictionSource> = set.iter().map(|s| s.source()).collect();
        assert_eq!(
            sources,
            vec![
                PredictionSource::HotGroup,
                PredictionSource::Trend,
                PredictionSource::Alternation,
                PredictionSource::Absent,
            ]
        );
    }
}
