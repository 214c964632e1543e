//! CART classification trees and a bagged random forest.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self { n_trees: 50, max_depth: 8, min_samples_split: 5, min_samples_leaf: 2, seed: 42 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        /// Fraction of positive labels that reached this leaf.
        positive: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Node,
    /// Total weighted impurity decrease per feature.
    importances: Vec<f64>,
}

struct TreeBuilder<'a> {
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    config: &'a ForestConfig,
    max_features: usize,
    importances: Vec<f64>,
    total: f64,
}

fn gini(positive: f64, n: f64) -> f64 {
    if n == 0.0 {
        return 0.0;
    }
    let p = positive / n;
    2.0 * p * (1.0 - p)
}

impl TreeBuilder<'_> {
    fn build(&mut self, rows: Vec<usize>, depth: usize, rng: &mut ChaCha8Rng) -> Node {
        let n = rows.len();
        let positive: f64 = rows.iter().map(|&r| self.y[r]).sum();
        let leaf = Node::Leaf { positive: if n == 0 { 0.5 } else { positive / n as f64 } };

        if depth >= self.config.max_depth
            || n < self.config.min_samples_split
            || positive == 0.0
            || positive == n as f64
        {
            return leaf;
        }

        let width = self.x.ncols();
        let features = sample(rng, width, self.max_features.min(width));
        let parent = gini(positive, n as f64);

        let mut best: Option<(usize, f64, f64)> = None;
        for feature in features.iter() {
            if let Some((threshold, impurity)) = self.best_split(&rows, feature, positive) {
                if impurity < parent && best.map_or(true, |(_, _, b)| impurity < b) {
                    best = Some((feature, threshold, impurity));
                }
            }
        }
        let Some((feature, threshold, impurity)) = best else {
            return leaf;
        };

        self.importances[feature] += (n as f64 / self.total) * (parent - impurity);
        let (left, right): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| self.x[[r, feature]] <= threshold);
        Node::Split {
            feature,
            threshold,
            left: Box::new(self.build(left, depth + 1, rng)),
            right: Box::new(self.build(right, depth + 1, rng)),
        }
    }

    /// Lowest weighted Gini over thresholds of one feature, by a single
    /// sweep over the rows sorted on that feature.
    fn best_split(&self, rows: &[usize], feature: usize, positive: f64) -> Option<(f64, f64)> {
        let mut sorted: Vec<(f64, f64)> = rows.iter().map(|&r| (self.x[[r, feature]], self.y[r])).collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = sorted.len() as f64;
        let min_leaf = self.config.min_samples_leaf.max(1);
        let mut left_pos = 0.0;
        let mut best: Option<(f64, f64)> = None;
        for i in 0..sorted.len() - 1 {
            left_pos += sorted[i].1;
            let left_n = i + 1;
            let right_n = sorted.len() - left_n;
            if left_n < min_leaf || right_n < min_leaf || sorted[i].0 == sorted[i + 1].0 {
                continue;
            }
            let impurity = (left_n as f64 / n) * gini(left_pos, left_n as f64)
                + (right_n as f64 / n) * gini(positive - left_pos, right_n as f64);
            if best.map_or(true, |(_, b)| impurity < b) {
                best = Some(((sorted[i].0 + sorted[i + 1].0) / 2.0, impurity));
            }
        }
        best
    }
}

impl DecisionTree {
    fn fit<'a>(
        x: ArrayView2<'a, f64>,
        y: ArrayView1<'a, f64>,
        rows: Vec<usize>,
        config: &'a ForestConfig,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let width = x.ncols();
        let max_features = ((width as f64).sqrt().round() as usize).max(1);
        let mut builder = TreeBuilder {
            x,
            y,
            config,
            max_features,
            importances: vec![0.0; width],
            total: rows.len().max(1) as f64,
        };
        let root = if rows.is_empty() || width == 0 {
            Node::Leaf { positive: 0.5 }
        } else {
            builder.build(rows, 0, rng)
        };
        Self { root, importances: builder.importances }
    }

    pub fn predict_proba(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { positive } => return *positive,
                Node::Split { feature, threshold, left, right } => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    node = if value <= *threshold { left } else { right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self { config, trees: Vec::new() }
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Trees are grown in parallel. Each one draws its bootstrap sample from
    /// a stream seeded by its index, so a given dataset always produces the
    /// same forest.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) {
        let n = x.nrows();
        if n == 0 || n != y.len() {
            self.trees.clear();
            return;
        }
        let config = &self.config;
        let trees: Vec<DecisionTree> = (0..config.n_trees)
            .into_par_iter()
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(i as u64));
                let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::fit(x.view(), y.view(), rows, config, &mut rng)
            })
            .collect();
        self.trees = trees;
    }

    pub fn predict_proba(&self, row: ArrayView1<f64>) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        self.trees.iter().map(|t| t.predict_proba(row)).sum::<f64>() / self.trees.len() as f64
    }

    /// Mean impurity decrease per feature, normalised to sum to one.
    pub fn feature_importances(&self) -> Vec<f64> {
        let width = self.trees.first().map_or(0, |t| t.importances.len());
        let mut totals = vec![0.0; width];
        for tree in &self.trees {
            for (t, v) in totals.iter_mut().zip(&tree.importances) {
                *t += v;
            }
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|t| *t /= sum);
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn threshold_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 2), |(i, j)| if j == 0 { i as f64 } else { ((i * 7) % 11) as f64 });
        let y = Array1::from_shape_fn(60, |i| if i >= 30 { 1.0 } else { 0.0 });
        (x, y)
    }

    #[test]
    fn separates_on_the_informative_feature() {
        let (x, y) = threshold_data();
        let mut forest = RandomForest::new(ForestConfig { n_trees: 20, ..Default::default() });
        forest.fit(&x, &y);
        assert!(forest.predict_proba(array![55.0, 3.0].view()) > 0.8);
        assert!(forest.predict_proba(array![5.0, 3.0].view()) < 0.2);

        let imp = forest.feature_importances();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn fitting_is_deterministic() {
        let (x, y) = threshold_data();
        let mut a = RandomForest::new(ForestConfig { n_trees: 5, ..Default::default() });
        let mut b = a.clone();
        a.fit(&x, &y);
        b.fit(&x, &y);
        assert_eq!(a, b);
    }

    #[test]
    fn pure_labels_make_a_single_leaf() {
        let x = Array2::from_shape_fn((10, 1), |(i, _)| i as f64);
        let y = Array1::from_elem(10, 1.0);
        let mut forest = RandomForest::new(ForestConfig { n_trees: 3, ..Default::default() });
        forest.fit(&x, &y);
        assert_eq!(forest.predict_proba(array![100.0].view()), 1.0);
        assert_eq!(forest.feature_importances(), vec![0.0]);
    }

    #[test]
    fn unfitted_forest_is_neutral() {
        assert_eq!(RandomForest::new(ForestConfig::default()).predict_proba(array![1.0].view()), 0.5);
    }
}
