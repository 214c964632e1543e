use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use common::{Candle, CandleSeries, Direction};
use strategy::{compute_indicators, fold_signals, Indicator, IndicatorConfig, RuleSignal, StrategySuite};

fn series(bars: &[(f64, f64, f64)]) -> CandleSeries {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let candles = bars
        .iter()
        .enumerate()
        .map(|(i, &(close, spread, volume))| Candle {
            timestamp: start + Duration::hours(i as i64),
            open: close,
            high: close * (1.0 + spread),
            low: close * (1.0 - spread),
            close,
            volume,
        })
        .collect();
    CandleSeries::new(candles).unwrap()
}

proptest! {
    /// A strategy with balanced evidence (means within the margin) holds,
    /// and its strength reports how balanced the evidence was.
    #[test]
    fn balanced_rules_hold(
        rules in prop::collection::vec((any::<bool>(), 0.0f64..=1.0), 1..12),
    ) {
        let signals: Vec<RuleSignal> = rules
            .iter()
            .map(|&(buy, s)| if buy { RuleSignal::buy(s, "b") } else { RuleSignal::sell(s, "s") })
            .collect();
        let n = signals.len() as f64;
        let buy: f64 = rules.iter().filter(|r| r.0).map(|r| r.1).sum::<f64>() / n;
        let sell: f64 = rules.iter().filter(|r| !r.0).map(|r| r.1).sum::<f64>() / n;
        let diff = (buy - sell).abs();
        // skip the knife edge at exactly the margin
        prop_assume!((diff - 0.2).abs() > 1e-9);

        let out = fold_signals("p", &signals);
        if diff < 0.2 {
            prop_assert_eq!(out.direction, Direction::Hold);
            prop_assert!((out.strength - (1.0 - diff)).abs() < 1e-9);
        } else if buy > sell {
            prop_assert_eq!(out.direction, Direction::Buy);
            prop_assert!((out.strength - buy).abs() < 1e-9);
        } else {
            prop_assert_eq!(out.direction, Direction::Sell);
            prop_assert!((out.strength - sell).abs() < 1e-9);
        }
    }

    /// Short or irregular histories never panic; columns stay aligned and
    /// whatever is present is finite.
    #[test]
    fn indicator_engine_never_panics(
        bars in prop::collection::vec((0.01f64..100_000.0, 0.0f64..0.2, 0.0f64..1e6), 0..140),
    ) {
        let frame = compute_indicators(&series(&bars), &IndicatorConfig::default());
        prop_assert_eq!(frame.len(), bars.len());
        for ind in Indicator::ALL {
            let col = frame.column(ind).unwrap();
            prop_assert_eq!(col.len(), bars.len());
            prop_assert!(col.iter().flatten().all(|v| v.is_finite()));
        }
        if let Some(snap) = frame.latest_snapshot() {
            let out = StrategySuite::default().evaluate(&snap);
            for s in [out.trend, out.mean_reversion, out.breakout, out.volume] {
                prop_assert!((0.0..=1.0).contains(&s.strength));
            }
        }
    }

    /// Rows inside the SMA-200 warm-up are always missing.
    #[test]
    fn warmup_rows_are_missing(len in 1usize..250) {
        let bars: Vec<(f64, f64, f64)> = (0..len).map(|i| (100.0 + i as f64, 0.01, 10.0)).collect();
        let frame = compute_indicators(&series(&bars), &IndicatorConfig::default());
        for i in 0..len.min(199) {
            prop_assert!(frame.value(Indicator::Sma200, i).is_none());
        }
    }
}
