pub mod ensemble;
pub mod features;
pub mod forest;
pub mod logistic;
pub mod scaler;
pub mod store;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{Prediction, Result, SignalKind};
use strategy::IndicatorFrame;

pub use ensemble::{EnsembleConfig, EnsemblePredictor};
pub use features::{feature_names, feature_row, Dataset, FEATURE_COUNT};
pub use store::{FileModelStore, MemoryModelStore, ModelStore};

/// Fewer labelled rows than this and training is refused.
pub const MIN_TRAINING_ROWS: usize = 50;

/// Confidence reported when only one member voted.
pub const SINGLE_MEMBER_CONFIDENCE: f64 = 0.5;

/// Up/down probability estimator over an indicator frame.
///
/// `predict` never fails: an untrained model, a warm-up row or a malformed
/// feature vector all produce [`Prediction::neutral`].
pub trait Predictor: Send + Sync {
    fn name(&self) -> &str;

    fn train(&mut self, frame: &IndicatorFrame, now: DateTime<Utc>) -> Result<TrainingReport>;

    fn predict(&self, frame: &IndicatorFrame, at: usize) -> Prediction;

    fn predict_latest(&self, frame: &IndicatorFrame) -> Prediction {
        match frame.len().checked_sub(1) {
            Some(at) => self.predict(frame, at),
            None => Prediction::neutral(),
        }
    }

    fn is_trained(&self) -> bool;

    fn trained_at(&self) -> Option<DateTime<Utc>>;

    fn save(&self, store: &dyn ModelStore, key: &str) -> Result<()>;

    /// `Ok(false)` when the store holds nothing under `key`.
    fn load(&mut self, store: &dyn ModelStore, key: &str) -> Result<bool>;
}

/// Builds a fresh, untrained predictor. One is made per traded symbol.
pub type PredictorFactory = Arc<dyn Fn() -> Box<dyn Predictor> + Send + Sync>;

pub fn ensemble_factory(config: EnsembleConfig) -> PredictorFactory {
    Arc::new(move || Box::new(EnsemblePredictor::new(config.clone())) as Box<dyn Predictor>)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberReport {
    pub name: String,
    /// Hold-out accuracy; `None` when the hold-out set was empty.
    pub accuracy: Option<f64>,
    /// Sorted from most to least important.
    pub importances: Vec<FeatureImportance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub samples: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub positive_rate: f64,
    pub members: Vec<MemberReport>,
    pub trained_at: DateTime<Utc>,
}

/// Mean member probability, with confidence = 1 − population std dev
/// across members.
pub fn combine_members(probabilities: &[f64]) -> Prediction {
    if probabilities.is_empty() {
        return Prediction::neutral();
    }
    let n = probabilities.len() as f64;
    let mean = probabilities.iter().sum::<f64>() / n;
    let confidence = if probabilities.len() > 1 {
        let var = probabilities.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
        (1.0 - var.sqrt()).clamp(0.0, 1.0)
    } else {
        SINGLE_MEMBER_CONFIDENCE
    };
    Prediction {
        probability: mean.clamp(0.0, 1.0),
        confidence,
        signal: signal_for(mean, confidence),
        member_probabilities: probabilities.to_vec(),
    }
}

pub fn signal_for(probability: f64, confidence: f64) -> SignalKind {
    if probability > 0.6 && confidence > 0.6 {
        SignalKind::StrongBuy
    } else if probability > 0.55 {
        SignalKind::Buy
    } else if probability < 0.4 && confidence > 0.6 {
        SignalKind::StrongSell
    } else if probability < 0.45 {
        SignalKind::Sell
    } else {
        SignalKind::Hold
    }
}
