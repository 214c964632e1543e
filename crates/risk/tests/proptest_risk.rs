use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use common::{ExitReason, OrderSide, SizingMethod};
use risk::{size_position, RiskConfig, RiskManager};

fn side(buy: bool) -> OrderSide {
    if buy {
        OrderSide::Buy
    } else {
        OrderSide::Sell
    }
}

proptest! {
    /// Kelly-path size never shrinks as confidence grows, all else fixed.
    #[test]
    fn sizing_is_monotonic_in_confidence(
        capital in 100.0f64..1_000_000.0,
        price in 0.01f64..100_000.0,
        stop in 0.005f64..0.2,
        a in 0.0f64..=1.0,
        b in 0.0f64..=1.0,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let config = RiskConfig { stop_loss_pct: stop, sizing_method: SizingMethod::Kelly, ..RiskConfig::default() };
        let q = |c: f64| size_position(&config, capital, OrderSide::Buy, price, c).map_or(0.0, |s| s.quantity);
        prop_assert!(q(lo) <= q(hi) + 1e-12);
        if let Some(s) = size_position(&config, capital, OrderSide::Buy, price, hi) {
            prop_assert!(s.kelly_fraction <= config.kelly.max_fraction);
            prop_assert!(s.notional <= capital * risk::MAX_CAPITAL_FRACTION + 1e-6);
        }
    }

    /// Opening and closing at the entry price leaves capital and equity
    /// where they started, whatever the order of operations.
    #[test]
    fn flat_round_trips_conserve_capital(
        trades in prop::collection::vec((any::<bool>(), 1.0f64..50_000.0, 0.5f64..1.0), 1..6),
        fixed in any::<bool>(),
    ) {
        let config = RiskConfig {
            max_open_positions: 10,
            sizing_method: if fixed { SizingMethod::Fixed } else { SizingMethod::Kelly },
            ..RiskConfig::default()
        };
        let mut rm = RiskManager::new(config);
        let start = rm.capital();
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();

        let mut opened = Vec::new();
        for (i, &(buy, price, confidence)) in trades.iter().enumerate() {
            let symbol = format!("S{i}/USDT");
            if let Some(size) = rm.size_position(side(buy), price, confidence) {
                let p = rm.open_position(&symbol, side(buy), price, &size, now).unwrap();
                opened.push((p.id().to_string(), price));
            }
            let notional: f64 = rm.positions().map(|p| p.notional()).sum();
            prop_assert!((rm.capital() + notional - start).abs() < 1e-6 * start);
            prop_assert!((rm.equity() - start).abs() < 1e-6 * start);
        }
        for (id, price) in opened.iter().rev() {
            let trade = rm.close_position(id, *price, ExitReason::Manual, now + Duration::hours(1)).unwrap();
            prop_assert_eq!(trade.pnl, 0.0);
        }
        prop_assert!((rm.capital() - start).abs() < 1e-6 * start);
        prop_assert_eq!(rm.open_count(), 0);
    }

    /// Marking, exit checks and closes at any positive price never panic
    /// and keep the equity identity.
    #[test]
    fn lifecycle_never_panics_on_extreme_prices(
        entry in 0.0001f64..1_000_000.0,
        mark in 0.0001f64..1_000_000.0,
        buy in any::<bool>(),
        hours in 0i64..100,
    ) {
        let mut rm = RiskManager::new(RiskConfig { sizing_method: SizingMethod::Fixed, ..RiskConfig::default() });
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        let size = rm.size_position(side(buy), entry, 0.9).unwrap();
        let p = rm.open_position("X/USDT", side(buy), entry, &size, now).unwrap();

        let pnl = rm.update_position_pnl(p.id(), mark).unwrap();
        prop_assert!(pnl.is_finite());
        let expected = rm.capital() + p.notional() + pnl;
        prop_assert!((rm.equity() - expected).abs() <= 1e-9 * expected.abs().max(1.0));

        let later = now + Duration::hours(hours);
        let reason = rm.check_exit(p.id(), mark, later).unwrap();
        if hours > 24 {
            prop_assert!(reason.is_some());
        }
        let trade = rm.close_position(p.id(), mark, reason.unwrap_or(ExitReason::Manual), later).unwrap();
        prop_assert!((trade.pnl - pnl).abs() <= 1e-9 * pnl.abs().max(1.0));
    }
}
