//! Feature construction
//!
//! Turns a trailing window of outcomes into a fixed-length numeric vector.
//!
//! Layout:
//! - history block: everything derived from the last `window_size` observed
//!   outcomes, anchored on the most recent one ("current")
//! - label block: features that need the target outcome. Only filled in
//!   training mode; inference rows carry [`SENTINEL`] there.
//!
//! Both modes produce vectors of the same width for a given configuration.

use statrs::statistics::Statistics;

use crate::config::FeatureConfig;
use crate::models::{Category, CategoryScheme, Outcome};

/// Neutral value for features that cannot be computed for a row
pub const SENTINEL: f64 = -1.0;

/// Features in the history block besides the per-sub-window pairs
const HISTORY_FIXED: usize = 17;
/// Features in the label block
const LABEL_BLOCK: usize = 3;

const TREND_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    /// Overwrite the label block with sentinels, making a training row look
    /// exactly like an inference row would.
    pub fn neutralize_label_block(&mut self) {
        let start = self.0.len().saturating_sub(LABEL_BLOCK);
        for v in &mut self.0[start..] {
            *v = SENTINEL;
        }
    }

    pub fn label_block(&self) -> &[f64] {
        &self.0[self.0.len().saturating_sub(LABEL_BLOCK)..]
    }
}

#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    window_size: usize,
    sub_windows: Vec<usize>,
    trend_k: usize,
    scheme: CategoryScheme,
}

impl FeatureBuilder {
    pub fn new(config: &FeatureConfig, scheme: CategoryScheme) -> Self {
        Self {
            window_size: config.window_size,
            sub_windows: config.sub_windows.clone(),
            trend_k: config.trend_k,
            scheme,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn scheme(&self) -> CategoryScheme {
        self.scheme
    }

    /// Minimum number of outcomes `build` needs
    pub fn required_len(&self, training_mode: bool) -> usize {
        if training_mode {
            self.window_size + 1
        } else {
            self.window_size
        }
    }

    /// Width of every vector this builder produces
    pub fn width(&self) -> usize {
        HISTORY_FIXED + 2 * self.sub_windows.len() + LABEL_BLOCK
    }

    /// Build a row from the tail of `window`.
    ///
    /// In training mode the last outcome is the target and the `window_size`
    /// outcomes before it are the history. Returns `None` when the window is
    /// too short.
    pub fn build(&self, window: &[Outcome], training_mode: bool) -> Option<FeatureVector> {
        let needed = self.required_len(training_mode);
        if window.len() < needed || self.window_size == 0 {
            return None;
        }

        let tail = &window[window.len() - needed..];
        let (history, target) = if training_mode {
            (&tail[..self.window_size], tail.last())
        } else {
            (tail, None)
        };

        let cats: Vec<Category> = history
            .iter()
            .map(|o| self.scheme.categorize(o.value))
            .collect();
        let values: Vec<f64> = history.iter().map(|o| o.value as f64).collect();
        let len = cats.len();
        let current = cats[len - 1];
        let current_value = history[len - 1].value;

        let mut row = Vec::with_capacity(self.width());

        // category of current and the three lags
        let lag = |k: usize| -> Option<Category> { len.checked_sub(1 + k).map(|i| cats[i]) };
        row.push(current.0 as f64);
        for k in 1..=3 {
            row.push(lag(k).map_or(SENTINEL, |c| c.0 as f64));
        }
        for k in 1..=3 {
            row.push(lag(k).map_or(SENTINEL, |c| (c == current) as u8 as f64));
        }

        // rolling frequency of the current category
        for &size in &self.sub_windows {
            let n = size.min(len);
            let count = cats[len - n..].iter().filter(|&&c| c == current).count();
            row.push(count as f64);
            row.push(count as f64 / n as f64);
        }

        row.push(trend_sign(&values, self.trend_k));
        row.push(gap_since_previous(&cats) as f64);
        row.push(repeat_streak(&cats) as f64);

        // raw value transforms
        row.push(current_value as f64);
        row.push((current_value % 2) as f64);
        row.push((current_value % 3) as f64);
        row.push((current_value % 10) as f64);
        row.push((current_value / 10) as f64);
        row.push((current_value == 0) as u8 as f64);

        row.push(values.iter().mean());

        match target {
            Some(target) => {
                let target_cat = self.scheme.categorize(target.value);
                let last_seen = cats.iter().rposition(|&c| c == target_cat);
                let freq = cats.iter().filter(|&&c| c == target_cat).count();
                row.push((target_cat == current) as u8 as f64);
                row.push(last_seen.map_or(len as f64 + 1.0, |i| (len - i) as f64));
                row.push(freq as f64 / len as f64);
            }
            None => row.extend(std::iter::repeat(SENTINEL).take(LABEL_BLOCK)),
        }

        debug_assert_eq!(row.len(), self.width());
        Some(FeatureVector(row))
    }
}

/// Sign of the mean successive difference over the last `k` values.
pub fn trend_sign(values: &[f64], k: usize) -> f64 {
    let start = values.len().saturating_sub(k);
    let recent = &values[start..];
    if recent.len() < 2 {
        return 0.0;
    }
    let diffs: Vec<f64> = recent.windows(2).map(|w| w[1] - w[0]).collect();
    let mean = diffs.iter().mean();
    if mean > TREND_EPSILON {
        1.0
    } else if mean < -TREND_EPSILON {
        -1.0
    } else {
        0.0
    }
}

/// Outcomes between the last category and its previous occurrence.
/// Never seen before counts as the whole history length.
fn gap_since_previous(cats: &[Category]) -> usize {
    let Some((&current, rest)) = cats.split_last() else {
        return 0;
    };
    match rest.iter().rposition(|&c| c == current) {
        Some(i) => cats.len() - 1 - i,
        None => cats.len(),
    }
}

/// Length of the run of identical categories ending at the last position.
fn repeat_streak(cats: &[Category]) -> usize {
    let Some(&current) = cats.last() else {
        return 0;
    };
    cats.iter().rev().take_while(|&&c| c == current).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::OutcomeStore;

    fn outcomes(values: &[u32]) -> Vec<Outcome> {
        let mut store = OutcomeStore::in_memory();
        for (i, v) in values.iter().enumerate() {
            store.append(*v, &format!("o-{i}"));
        }
        store.outcomes().to_vec()
    }

    fn builder(window_size: usize) -> FeatureBuilder {
        let config = FeatureConfig {
            window_size,
            sub_windows: vec![3, 5, 10],
            trend_k: 5,
        };
        FeatureBuilder::new(&config, CategoryScheme::default())
    }

    #[test]
    fn test_short_windows_return_none() {
        let b = builder(6);
        for n in 0..6 {
            let w = outcomes(&vec![5; n]);
            assert!(b.build(&w, false).is_none(), "inference len {n}");
            assert!(b.build(&w, true).is_none(), "training len {n}");
        }
        let w = outcomes(&[5; 6]);
        assert!(b.build(&w, false).is_some());
        assert!(b.build(&w, true).is_none());
    }

    #[test]
    fn test_width_is_identical_in_both_modes() {
        let b = builder(6);
        let values: Vec<u32> = (0..40).map(|i| (i * 7 + 3) % 37).collect();
        let all = outcomes(&values);
        for end in 7..=all.len() {
            let train = b.build(&all[..end], true).unwrap();
            let live = b.build(&all[..end], false).unwrap();
            assert_eq!(train.len(), b.width());
            assert_eq!(live.len(), b.width());
        }
    }

    #[test]
    fn test_inference_label_block_is_sentinel() {
        let b = builder(5);
        let w = outcomes(&[1, 20, 3, 25, 4, 30]);
        let live = b.build(&w, false).unwrap();
        assert!(live.label_block().iter().all(|&v| v == SENTINEL));

        let mut train = b.build(&w, true).unwrap();
        assert!(train.label_block().iter().any(|&v| v != SENTINEL));
        train.neutralize_label_block();
        assert!(train.label_block().iter().all(|&v| v == SENTINEL));
    }

    #[test]
    fn test_training_row_history_matches_inference_row() {
        // the training row for target t must describe the same history the
        // live row saw just before t arrived
        let b = builder(5);
        let w = outcomes(&[1, 20, 3, 25, 4, 30, 2]);
        let mut train = b.build(&w, true).unwrap();
        train.neutralize_label_block();
        let live = b.build(&w[..w.len() - 1], false).unwrap();
        assert_eq!(train, live);
    }

    #[test]
    fn test_streak_gap_and_trend() {
        let b = builder(5);
        // low low high high high
        let w = outcomes(&[2, 4, 20, 25, 30]);
        let row = b.build(&w, false).unwrap().into_inner();

        assert_eq!(row[0], 2.0); // current is high
        assert_eq!(&row[1..4], &[2.0, 2.0, 1.0]);
        assert_eq!(&row[4..7], &[1.0, 1.0, 0.0]);
        // sub-window 3: three highs
        assert_eq!(row[7], 3.0);
        assert_eq!(row[8], 1.0);

        let after_freq = 7 + 2 * 3;
        assert_eq!(row[after_freq], 1.0); // rising
        assert_eq!(row[after_freq + 1], 1.0); // previous high one step back
        assert_eq!(row[after_freq + 2], 3.0); // streak of highs
        assert_eq!(row[after_freq + 3], 30.0);
        assert_eq!(row[after_freq + 6], 0.0); // last digit of 30
    }

    #[test]
    fn test_build_is_deterministic() {
        let b = builder(8);
        let values: Vec<u32> = (0..20).map(|i| (i * 13) % 37).collect();
        let w = outcomes(&values);
        assert_eq!(b.build(&w, true), b.build(&w, true));
        assert_eq!(b.build(&w, false), b.build(&w, false));
    }

    #[test]
    fn test_trend_sign_flat_and_falling() {
        assert_eq!(trend_sign(&[5.0, 5.0, 5.0], 5), 0.0);
        assert_eq!(trend_sign(&[30.0, 20.0, 10.0], 5), -1.0);
        assert_eq!(trend_sign(&[1.0], 5), 0.0);
    }
}
