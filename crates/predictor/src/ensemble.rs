use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use common::{Error, Prediction, Result};
use strategy::IndicatorFrame;

use crate::features::{feature_names, feature_row, Dataset, FEATURE_COUNT};
use crate::forest::{ForestConfig, RandomForest};
use crate::logistic::{LogisticConfig, LogisticModel};
use crate::scaler::StandardScaler;
use crate::store::ModelStore;
use crate::{combine_members, FeatureImportance, MemberReport, Predictor, TrainingReport, MIN_TRAINING_ROWS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    pub logistic: LogisticConfig,
    pub forest: ForestConfig,
    /// Leading share of rows used for fitting; the rest is held out.
    pub train_fraction: f64,
    pub min_rows: usize,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            logistic: LogisticConfig::default(),
            forest: ForestConfig::default(),
            train_fraction: 0.8,
            min_rows: MIN_TRAINING_ROWS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Member {
    Logistic(LogisticModel),
    Forest(RandomForest),
}

impl Member {
    fn name(&self) -> &'static str {
        match self {
            Member::Logistic(_) => "logistic_regression",
            Member::Forest(_) => "random_forest",
        }
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) {
        match self {
            Member::Logistic(m) => m.fit(x, y),
            Member::Forest(m) => m.fit(x, y),
        }
    }

    fn predict_proba(&self, row: ArrayView1<f64>) -> f64 {
        match self {
            Member::Logistic(m) => m.predict_proba(row),
            Member::Forest(m) => m.predict_proba(row),
        }
    }

    fn feature_importances(&self) -> Vec<f64> {
        match self {
            Member::Logistic(m) => m.feature_importances(),
            Member::Forest(m) => m.feature_importances(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrainedState {
    scaler: StandardScaler,
    members: Vec<Member>,
    trained_at: DateTime<Utc>,
    report: TrainingReport,
}

/// Logistic regression and a random forest over standardised features,
/// combined by mean probability and member agreement.
#[derive(Debug, Clone, Default)]
pub struct EnsemblePredictor {
    config: EnsembleConfig,
    state: Option<TrainedState>,
}

impl EnsemblePredictor {
    pub fn new(config: EnsembleConfig) -> Self {
        Self { config, state: None }
    }

    pub fn last_report(&self) -> Option<&TrainingReport> {
        self.state.as_ref().map(|s| &s.report)
    }
}

fn accuracy(member: &Member, x: &Array2<f64>, y: &Array1<f64>) -> Option<f64> {
    if x.nrows() == 0 {
        return None;
    }
    let correct = x
        .outer_iter()
        .zip(y)
        .filter(|(row, label)| (member.predict_proba(row.view()) > 0.5) == (**label > 0.5))
        .count();
    Some(correct as f64 / x.nrows() as f64)
}

fn ranked_importances(values: &[f64]) -> Vec<FeatureImportance> {
    let mut out: Vec<FeatureImportance> = feature_names()
        .into_iter()
        .zip(values)
        .map(|(feature, &importance)| FeatureImportance { feature: feature.to_string(), importance })
        .collect();
    out.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    out
}

impl Predictor for EnsemblePredictor {
    fn name(&self) -> &str {
        "ensemble"
    }

    fn train(&mut self, frame: &IndicatorFrame, now: DateTime<Utc>) -> Result<TrainingReport> {
        let dataset = Dataset::from_frame(frame);
        if dataset.len() < self.config.min_rows {
            return Err(Error::InsufficientHistory { needed: self.config.min_rows, available: dataset.len() });
        }

        let (train, test) = dataset.split(self.config.train_fraction);
        let (x_train, y_train) = train.to_arrays();
        let (x_test, y_test) = test.to_arrays();
        let scaler = StandardScaler::fit(&x_train);
        let x_train = scaler.transform_all(&x_train);
        let x_test = scaler.transform_all(&x_test);

        let mut members = vec![
            Member::Logistic(LogisticModel::new(self.config.logistic.clone())),
            Member::Forest(RandomForest::new(self.config.forest.clone())),
        ];
        let mut reports = Vec::with_capacity(members.len());
        for member in &mut members {
            member.fit(&x_train, &y_train);
            let report = MemberReport {
                name: member.name().to_string(),
                accuracy: accuracy(member, &x_test, &y_test),
                importances: ranked_importances(&member.feature_importances()),
            };
            info!(member = %report.name, accuracy = ?report.accuracy, "Model member trained");
            reports.push(report);
        }

        let report = TrainingReport {
            samples: dataset.len(),
            train_rows: train.len(),
            test_rows: test.len(),
            positive_rate: train.positive_rate(),
            members: reports,
            trained_at: now,
        };
        self.state = Some(TrainedState { scaler, members, trained_at: now, report: report.clone() });
        Ok(report)
    }

    fn predict(&self, frame: &IndicatorFrame, at: usize) -> Prediction {
        let Some(state) = &self.state else {
            debug!("No trained model, neutral prediction");
            return Prediction::neutral();
        };
        let Some(row) = feature_row(frame, at) else {
            debug!(at, "Incomplete feature row, neutral prediction");
            return Prediction::neutral();
        };
        if state.scaler.width() != row.len() {
            return Prediction::neutral();
        }
        let scaled = state.scaler.transform(Array1::from(row).view());
        let probabilities: Vec<f64> = state.members.iter().map(|m| m.predict_proba(scaled.view())).collect();
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Prediction::neutral();
        }
        combine_members(&probabilities)
    }

    fn is_trained(&self) -> bool {
        self.state.is_some()
    }

    fn trained_at(&self) -> Option<DateTime<Utc>> {
        self.state.as_ref().map(|s| s.trained_at)
    }

    fn save(&self, store: &dyn ModelStore, key: &str) -> Result<()> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| Error::ModelUnavailable(format!("{key}: nothing trained to save")))?;
        store.save(key, &serde_json::to_vec(state)?)
    }

    fn load(&mut self, store: &dyn ModelStore, key: &str) -> Result<bool> {
        let Some(bytes) = store.load(key)? else {
            return Ok(false);
        };
        let state: TrainedState = serde_json::from_slice(&bytes)?;
        if state.scaler.width() != FEATURE_COUNT {
            return Err(Error::ModelUnavailable(format!(
                "{key}: stored model has {} features, expected {FEATURE_COUNT}",
                state.scaler.width()
            )));
        }
        self.state = Some(state);
        Ok(true)
    }
}
