pub mod breakout;
pub mod mean_reversion;
pub mod trend;
pub mod volume;

pub use breakout::Breakout;
pub use mean_reversion::MeanReversion;
pub use trend::TrendFollowing;
pub use volume::VolumeConfirmation;

use serde::Serialize;

use common::StrategySignal;

use crate::config::IndicatorConfig;
use crate::indicators::Snapshot;
use crate::Strategy;

/// Outputs of the four rule-based strategies for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategySignals {
    pub trend: StrategySignal,
    pub mean_reversion: StrategySignal,
    pub breakout: StrategySignal,
    pub volume: StrategySignal,
}

/// The fixed set of strategies the aggregator weighs.
#[derive(Debug, Clone, Default)]
pub struct StrategySuite {
    trend: TrendFollowing,
    mean_reversion: MeanReversion,
    breakout: Breakout,
    volume: VolumeConfirmation,
}

impl StrategySuite {
    pub fn new(config: &IndicatorConfig) -> Self {
        Self {
            trend: TrendFollowing,
            mean_reversion: MeanReversion::new(&config.rsi),
            breakout: Breakout,
            volume: VolumeConfirmation,
        }
    }

    pub fn evaluate(&self, snap: &Snapshot<'_>) -> StrategySignals {
        StrategySignals {
            trend: self.trend.evaluate(snap),
            mean_reversion: self.mean_reversion.evaluate(snap),
            breakout: self.breakout.evaluate(snap),
            volume: self.volume.evaluate(snap),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::compute_indicators;
    use crate::indicators::testutil::{series_from_closes, wave};

    #[test]
    fn suite_names_each_output() {
        let frame = compute_indicators(&series_from_closes(&wave(250)), &IndicatorConfig::default());
        let out = StrategySuite::default().evaluate(&frame.latest_snapshot().unwrap());
        assert_eq!(out.trend.strategy, "Trend Following");
        assert_eq!(out.mean_reversion.strategy, "Mean Reversion");
        assert_eq!(out.breakout.strategy, "Breakout");
        assert_eq!(out.volume.strategy, "Volume Analysis");
        for s in [&out.trend, &out.mean_reversion, &out.breakout, &out.volume] {
            assert!((0.0..=1.0).contains(&s.strength));
        }
    }
}
