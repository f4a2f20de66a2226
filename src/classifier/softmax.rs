//! Multinomial logistic regression
//!
//! Model: P(class c | x) = softmax(W·z + b)_c where z is x standardized with
//! the training means and standard deviations. Fitted with full-batch
//! gradient descent and an L2 penalty on W; no randomness, so the same rows
//! always give the same model.

use nalgebra::{DMatrix, DVector};

const MIN_SCALE: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
pub struct SoftmaxParams {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

#[derive(Debug, Clone)]
pub struct SoftmaxRegression {
    /// n_classes x n_features
    weights: DMatrix<f64>,
    bias: DVector<f64>,
    means: DVector<f64>,
    scales: DVector<f64>,
}

impl SoftmaxRegression {
    /// Fit on `rows` with class indices in `labels` (each `< n_classes`).
    /// Returns None for empty or ragged input.
    pub fn fit(
        rows: &[Vec<f64>],
        labels: &[usize],
        n_classes: usize,
        params: SoftmaxParams,
    ) -> Option<Self> {
        let n = rows.len();
        if n == 0 || n_classes == 0 || labels.len() != n {
            return None;
        }
        let d = rows[0].len();
        if rows.iter().any(|r| r.len() != d) || labels.iter().any(|&l| l >= n_classes) {
            return None;
        }

        let means = DVector::from_fn(d, |j, _| rows.iter().map(|r| r[j]).sum::<f64>() / n as f64);
        let scales = DVector::from_fn(d, |j, _| {
            let var = rows.iter().map(|r| (r[j] - means[j]).powi(2)).sum::<f64>() / n as f64;
            let sd = var.sqrt();
            if sd > MIN_SCALE {
                sd
            } else {
                1.0
            }
        });

        let x = DMatrix::from_fn(n, d, |i, j| (rows[i][j] - means[j]) / scales[j]);
        let y = DMatrix::from_fn(n, n_classes, |i, c| (labels[i] == c) as u8 as f64);

        let mut weights = DMatrix::<f64>::zeros(n_classes, d);
        let mut bias = DVector::<f64>::zeros(n_classes);

        for _ in 0..params.epochs {
            let mut probs = &x * weights.transpose();
            for i in 0..n {
                for c in 0..n_classes {
                    probs[(i, c)] += bias[c];
                }
            }
            softmax_rows(&mut probs);

            let residual = probs - &y;
            let grad_w = residual.transpose() * &x / n as f64 + &weights * params.l2;
            let grad_b = DVector::from_fn(n_classes, |c, _| residual.column(c).sum() / n as f64);

            weights -= grad_w * params.learning_rate;
            bias -= grad_b * params.learning_rate;
        }

        Some(Self {
            weights,
            bias,
            means,
            scales,
        })
    }

    pub fn input_width(&self) -> usize {
        self.weights.ncols()
    }

    pub fn n_classes(&self) -> usize {
        self.weights.nrows()
    }

    /// Class probabilities for one row, or None if the width is wrong.
    pub fn predict_proba(&self, row: &[f64]) -> Option<Vec<f64>> {
        if row.len() != self.input_width() {
            return None;
        }
        let z = DVector::from_fn(row.len(), |j, _| (row[j] - self.means[j]) / self.scales[j]);
        let logits = &self.weights * z + &self.bias;

        let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|v| (v - max).exp()).collect();
        let sum: f64 = exps.iter().sum();
        Some(exps.into_iter().map(|e| e / sum).collect())
    }
}

fn softmax_rows(m: &mut DMatrix<f64>) {
    let cols = m.ncols();
    for i in 0..m.nrows() {
        let mut max = f64::NEG_INFINITY;
        for c in 0..cols {
            max = max.max(m[(i, c)]);
        }
        let mut sum = 0.0;
        for c in 0..cols {
            let e = (m[(i, c)] - max).exp();
            m[(i, c)] = e;
            sum += e;
        }
        for c in 0..cols {
            m[(i, c)] /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SoftmaxParams {
        SoftmaxParams {
            epochs: 400,
            learning_rate: 0.5,
            l2: 1e-4,
        }
    }

    #[test]
    fn test_learns_separable_classes() {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..60 {
            let x = i as f64 / 10.0;
            rows.push(vec![x, 1.0]);
            labels.push(if x < 2.0 { 0 } else if x < 4.0 { 1 } else { 2 });
        }

        let model = SoftmaxRegression::fit(&rows, &labels, 3, params()).unwrap();
        assert_eq!(model.input_width(), 2);
        assert_eq!(model.n_classes(), 3);

        let p_low = model.predict_proba(&[0.2, 1.0]).unwrap();
        let p_high = model.predict_proba(&[5.8, 1.0]).unwrap();
        assert!(p_low[0] > p_low[2]);
        assert!(p_high[2] > p_high[0]);
        assert!((p_low.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_class_is_certain() {
        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let model = SoftmaxRegression::fit(&rows, &[0, 0], 1, params()).unwrap();
        let p = model.predict_proba(&[2.0, 3.0]).unwrap();
        assert_eq!(p.len(), 1);
        assert!((p[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(SoftmaxRegression::fit(&[], &[], 2, params()).is_none());
        let ragged = vec![vec![1.0], vec![1.0, 2.0]];
        assert!(SoftmaxRegression::fit(&ragged, &[0, 1], 2, params()).is_none());
        let rows = vec![vec![1.0, 2.0]];
        let model = SoftmaxRegression::fit(&rows, &[0], 1, params()).unwrap();
        assert!(model.predict_proba(&[1.0]).is_none());
    }
}
