use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Per-feature standardisation to zero mean and unit variance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Array1<f64>,
    stds: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Self {
        let Some(means) = x.mean_axis(Axis(0)) else {
            return Self::default();
        };
        // constant columns pass through centred but unscaled
        let stds = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 1e-12 { s } else { 1.0 });
        Self { means, stds }
    }

    pub fn width(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, row: ArrayView1<f64>) -> Array1<f64> {
        &(&row - &self.means) / &self.stds
    }

    pub fn transform_all(&self, x: &Array2<f64>) -> Array2<f64> {
        &(x - &self.means) / &self.stds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn standardises_columns() {
        let x = array![[1.0, 5.0], [3.0, 5.0]];
        let scaler = StandardScaler::fit(&x);
        assert_eq!(scaler.transform(array![1.0, 5.0].view()), array![-1.0, 0.0]);
        assert_eq!(scaler.transform(array![3.0, 7.0].view()), array![1.0, 2.0]);
        assert_eq!(scaler.transform_all(&x), array![[-1.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn empty_fit_has_no_width() {
        assert_eq!(StandardScaler::fit(&Array2::zeros((0, 3))).width(), 0);
    }
}
