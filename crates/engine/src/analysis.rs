use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use common::{CandleSeries, Decision, Error, Prediction, Result};
use predictor::{ModelStore, Predictor, PredictorFactory, TrainingReport};
use strategy::{
    compute_indicators, IndicatorConfig, IndicatorFrame, SignalAggregator, StrategySuite, WARMUP_CANDLES,
};

/// Candles → indicators → strategies + predictor → one decision.
///
/// Shared verbatim by the live cycle and the backtester.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    indicators: IndicatorConfig,
    suite: StrategySuite,
    aggregator: SignalAggregator,
}

impl Analyzer {
    pub fn new(indicators: IndicatorConfig, aggregator: SignalAggregator) -> Self {
        Self { suite: StrategySuite::new(&indicators), indicators, aggregator }
    }

    pub fn frame(&self, candles: &CandleSeries) -> IndicatorFrame {
        compute_indicators(candles, &self.indicators)
    }

    /// Decision for row `at`. Rows inside the indicator warm-up are refused.
    pub fn decide(&self, frame: &IndicatorFrame, at: usize, predictor: Option<&dyn Predictor>) -> Result<Decision> {
        if at < WARMUP_CANDLES || at >= frame.len() {
            return Err(Error::InsufficientHistory { needed: WARMUP_CANDLES + 1, available: at.min(frame.len()) + 1 });
        }
        let snap = frame
            .snapshot(at)
            .ok_or(Error::InsufficientHistory { needed: WARMUP_CANDLES + 1, available: frame.len() })?;
        let signals = self.suite.evaluate(&snap);
        let prediction = predictor.map_or_else(Prediction::neutral, |p| p.predict(frame, at));
        let decision = self.aggregator.aggregate(signals, prediction);
        debug!(
            signal = %decision.signal,
            confidence = decision.confidence,
            buy = decision.buy_score,
            sell = decision.sell_score,
            "Decision"
        );
        Ok(decision)
    }

    pub fn decide_latest(&self, frame: &IndicatorFrame, predictor: Option<&dyn Predictor>) -> Result<Decision> {
        self.decide(frame, frame.len().saturating_sub(1), predictor)
    }
}

/// One predictor per symbol, persisted through a [`ModelStore`] and retrained
/// once older than the configured age.
pub struct ModelRegistry {
    factory: PredictorFactory,
    store: Arc<dyn ModelStore>,
    max_age: Duration,
    models: HashMap<String, Box<dyn Predictor>>,
}

impl ModelRegistry {
    pub fn new(factory: PredictorFactory, store: Arc<dyn ModelStore>, retrain_hours: i64) -> Self {
        Self { factory, store, max_age: Duration::hours(retrain_hours), models: HashMap::new() }
    }

    pub fn get(&self, symbol: &str) -> Option<&dyn Predictor> {
        self.models.get(symbol).map(|m| m.as_ref())
    }

    /// Load `symbol`'s model from the store if none is in memory yet.
    /// Returns whether a model is now available.
    pub fn ensure_loaded(&mut self, symbol: &str) -> bool {
        if self.models.get(symbol).is_some_and(|m| m.is_trained()) {
            return true;
        }
        let mut model = (self.factory)();
        match model.load(self.store.as_ref(), symbol) {
            Ok(true) => {
                info!(%symbol, trained_at = ?model.trained_at(), "Loaded saved model");
                self.models.insert(symbol.to_string(), model);
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(%symbol, error = %e, "Saved model unusable, will retrain");
                false
            }
        }
    }

    pub fn needs_training(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        match self.models.get(symbol).and_then(|m| m.trained_at()) {
            Some(at) => now.signed_duration_since(at) > self.max_age,
            None => true,
        }
    }

    /// Train a fresh model for `symbol` and persist it. The previous model
    /// stays in place if training fails.
    pub fn train(&mut self, symbol: &str, frame: &IndicatorFrame, now: DateTime<Utc>) -> Result<TrainingReport> {
        let mut model = (self.factory)();
        let report = model.train(frame, now)?;
        if let Err(e) = model.save(self.store.as_ref(), symbol) {
            warn!(%symbol, error = %e, "Failed to save trained model");
        }
        info!(%symbol, samples = report.samples, "Model trained");
        self.models.insert(symbol.to_string(), model);
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use common::{Candle, CandleSeries, Error, Prediction, Result, SignalKind};
    use predictor::{ModelStore, Predictor, TrainingReport};
    use strategy::{AggregatorWeights, IndicatorConfig, IndicatorFrame, SignalAggregator};

    use super::Analyzer;

    /// Always 95% up with full member agreement. Loads from any store.
    pub struct Bullish;

    impl Predictor for Bullish {
        fn name(&self) -> &str {
            "bullish"
        }

        fn train(&mut self, _frame: &IndicatorFrame, _now: DateTime<Utc>) -> Result<TrainingReport> {
            Err(Error::ModelUnavailable("scripted predictor cannot train".into()))
        }

        fn predict(&self, _frame: &IndicatorFrame, _at: usize) -> Prediction {
            Prediction { probability: 0.95, confidence: 1.0, signal: SignalKind::Buy, member_probabilities: vec![0.95] }
        }

        fn is_trained(&self) -> bool {
            true
        }

        fn trained_at(&self) -> Option<DateTime<Utc>> {
            Some(Utc::now())
        }

        fn save(&self, _store: &dyn ModelStore, _key: &str) -> Result<()> {
            Ok(())
        }

        fn load(&mut self, _store: &dyn ModelStore, _key: &str) -> Result<bool> {
            Ok(true)
        }
    }

    /// Confidence of a [`Bullish`] decision under [`predictor_only`].
    pub const BULLISH_CONFIDENCE: f64 = 0.9;

    /// Decisions driven by the predictor alone.
    pub fn predictor_only() -> Analyzer {
        let weights = AggregatorWeights {
            trend: 0.0,
            mean_reversion: 0.0,
            breakout: 0.0,
            volume: 0.0,
            predictor: 1.0,
            ..AggregatorWeights::default()
        };
        Analyzer::new(IndicatorConfig::default(), SignalAggregator::new(weights))
    }

    /// A gently rising market with a small oscillation, one candle per hour.
    pub fn trending(n: usize) -> CandleSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let candles = (0..n)
            .map(|i| {
                let t = i as f64;
                let close = 100.0 + t * 0.5 + 3.0 * (t / 5.0).sin();
                Candle {
                    timestamp: start + Duration::hours(i as i64),
                    open: close - 0.2,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1000.0 + 100.0 * (t / 3.0).cos(),
                }
            })
            .collect();
        CandleSeries::new(candles).unwrap()
    }
}
