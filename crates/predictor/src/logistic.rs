//! Logistic regression trained by batch gradient descent.

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticConfig {
    pub learning_rate: f64,
    pub max_iter: usize,
    pub tolerance: f64,
    /// L2 penalty on the weights (not the bias).
    pub l2: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self { learning_rate: 0.1, max_iter: 500, tolerance: 1e-7, l2: 1e-3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    config: LogisticConfig,
    weights: Array1<f64>,
    bias: f64,
    iterations: usize,
}

impl LogisticModel {
    pub fn new(config: LogisticConfig) -> Self {
        Self { config, weights: Array1::zeros(0), bias: 0.0, iterations: 0 }
    }

    pub fn is_fitted(&self) -> bool {
        !self.weights.is_empty()
    }

    /// Fit on a standardised `(samples, features)` matrix with 0/1 labels.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) {
        if x.nrows() == 0 || x.ncols() == 0 || x.nrows() != y.len() {
            return;
        }
        let n = x.nrows() as f64;
        let lr = self.config.learning_rate;
        let mut w = Array1::<f64>::zeros(x.ncols());
        let mut b = 0.0;
        let mut prev_loss = f64::INFINITY;
        let mut iterations = 0;

        for iter in 0..self.config.max_iter {
            iterations = iter + 1;
            let p = (x.dot(&w) + b).mapv(sigmoid);
            let err = &p - y;
            let dw = x.t().dot(&err) / n + &w * self.config.l2;
            let db = err.sum() / n;
            w.scaled_add(-lr, &dw);
            b -= lr * db;

            let loss = p.iter().zip(y).map(|(&p, &label)| log_loss(label, p)).sum::<f64>() / n;
            if (prev_loss - loss).abs() < self.config.tolerance {
                break;
            }
            prev_loss = loss;
        }

        self.weights = w;
        self.bias = b;
        self.iterations = iterations;
    }

    /// Probability of the positive class.
    pub fn predict_proba(&self, row: ArrayView1<f64>) -> f64 {
        if !self.is_fitted() || row.len() != self.weights.len() {
            return 0.5;
        }
        sigmoid(row.dot(&self.weights) + self.bias)
    }

    /// Normalised absolute weights.
    pub fn feature_importances(&self) -> Vec<f64> {
        let abs = self.weights.mapv(f64::abs);
        let total = abs.sum();
        if total == 0.0 {
            return vec![0.0; abs.len()];
        }
        (abs / total).to_vec()
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn log_loss(y: f64, p: f64) -> f64 {
    let p = p.clamp(1e-15, 1.0 - 1e-15);
    -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn learns_a_separable_boundary() {
        let x = Array2::from_shape_fn((40, 1), |(i, _)| (i as f64 - 20.0) / 10.0);
        let y = Array1::from_shape_fn(40, |i| if i >= 20 { 1.0 } else { 0.0 });
        let mut model = LogisticModel::new(LogisticConfig::default());
        model.fit(&x, &y);
        assert!(model.predict_proba(array![1.5].view()) > 0.8);
        assert!(model.predict_proba(array![-1.5].view()) < 0.2);
        assert_eq!(model.feature_importances(), vec![1.0]);
    }

    #[test]
    fn unfitted_model_is_neutral() {
        let model = LogisticModel::new(LogisticConfig::default());
        assert_eq!(model.predict_proba(array![1.0, 2.0].view()), 0.5);
    }

    #[test]
    fn wrong_width_is_neutral() {
        let x = Array2::from_shape_fn((10, 2), |(i, j)| (i + j) as f64);
        let y = Array1::from_shape_fn(10, |i| (i % 2) as f64);
        let mut model = LogisticModel::new(LogisticConfig::default());
        model.fit(&x, &y);
        assert_eq!(model.predict_proba(array![1.0].view()), 0.5);
    }

    #[test]
    fn sigmoid_is_stable_at_extremes() {
        assert!((sigmoid(800.0) - 1.0).abs() < 1e-12);
        assert!(sigmoid(-800.0) >= 0.0);
    }
}
