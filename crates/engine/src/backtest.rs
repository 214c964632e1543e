use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use common::{CandleSeries, ClosedTrade, Error, ExitReason, Result};
use predictor::Predictor;
use risk::{PerformanceStats, RiskConfig, RiskManager};
use strategy::WARMUP_CANDLES;

use crate::analysis::Analyzer;

/// Trading days per year used to annualize the per-step Sharpe ratio.
const ANNUALIZATION: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    /// Capital not tied up in positions.
    pub cash: f64,
    pub open_positions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub symbol: String,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub total_return_pct: f64,
    pub stats: PerformanceStats,
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough fall of the equity curve, as a fraction of the peak.
    pub max_drawdown: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<ClosedTrade>,
}

/// Candle-by-candle replay of the live decision, sizing and exit rules.
///
/// Each run drives its own [`RiskManager`] with candle timestamps as the
/// clock. Entries and exits fill at the candle close.
#[derive(Debug, Clone)]
pub struct Backtester {
    analyzer: Analyzer,
    risk_config: RiskConfig,
    warmup: usize,
}

impl Backtester {
    pub fn new(analyzer: Analyzer, risk_config: RiskConfig) -> Self {
        Self { analyzer, risk_config, warmup: WARMUP_CANDLES }
    }

    /// Skip more than the indicator warm-up before trading starts.
    pub fn with_warmup(mut self, warmup: usize) -> Self {
        self.warmup = warmup.max(WARMUP_CANDLES);
        self
    }

    pub fn run(&self, symbol: &str, candles: &CandleSeries, predictor: Option<&dyn Predictor>) -> Result<BacktestReport> {
        if candles.len() <= self.warmup {
            return Err(Error::InsufficientHistory { needed: self.warmup + 1, available: candles.len() });
        }
        let frame = self.analyzer.frame(candles);
        let mut risk = RiskManager::new(self.risk_config.clone());
        let mut curve = Vec::with_capacity(candles.len() - self.warmup);

        for (at, candle) in candles.candles().iter().enumerate().skip(self.warmup) {
            let (now, price) = (candle.timestamp, candle.close);

            let open: Vec<String> = risk.positions().map(|p| p.id().to_string()).collect();
            for id in open {
                risk.update_position_pnl(&id, price)?;
                if let Some(reason) = risk.check_exit(&id, price, now)? {
                    risk.close_position(&id, price, reason, now)?;
                }
            }

            if !risk.has_position(symbol) {
                let decision = self.analyzer.decide(&frame, at, predictor)?;
                let gate = risk.should_enter_trade(&decision, now);
                if let (true, Some(side)) = (gate.can_trade, decision.signal.side()) {
                    if let Some(size) = risk.size_position(side, price, decision.confidence) {
                        risk.open_position(symbol, side, price, &size, now)?;
                    }
                }
            }

            curve.push(equity_point(&risk, now));
        }

        if let Some(last) = candles.last() {
            let open: Vec<String> = risk.positions().map(|p| p.id().to_string()).collect();
            for id in open {
                risk.close_position(&id, last.close, ExitReason::BacktestEnd, last.timestamp)?;
            }
            if let Some(point) = curve.last_mut() {
                *point = equity_point(&risk, last.timestamp);
            }
        }

        let initial_capital = self.risk_config.initial_capital;
        let final_equity = risk.equity();
        let total_return = final_equity - initial_capital;
        let equities: Vec<f64> = curve.iter().map(|p| p.equity).collect();
        let report = BacktestReport {
            symbol: symbol.to_string(),
            initial_capital,
            final_equity,
            total_return,
            total_return_pct: if initial_capital > 0.0 { total_return / initial_capital * 100.0 } else { 0.0 },
            stats: risk.performance(),
            sharpe_ratio: sharpe_ratio(&equities),
            max_drawdown: max_drawdown(&equities),
            equity_curve: curve,
            trades: risk.trade_history().to_vec(),
        };
        info!(
            %symbol,
            trades = report.stats.total_trades,
            return_pct = report.total_return_pct,
            sharpe = report.sharpe_ratio,
            max_drawdown = report.max_drawdown,
            "Backtest complete"
        );
        Ok(report)
    }
}

fn equity_point(risk: &RiskManager, timestamp: DateTime<Utc>) -> EquityPoint {
    EquityPoint { timestamp, equity: risk.equity(), cash: risk.capital(), open_positions: risk.open_count() }
}

/// Mean over sample standard deviation of step returns, annualized.
/// Zero when there is no variation to measure.
pub fn sharpe_ratio(equity: &[f64]) -> f64 {
    let returns: Vec<f64> = equity.windows(2).filter(|w| w[0] != 0.0).map(|w| (w[1] - w[0]) / w[0]).collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    if std > 0.0 {
        mean / std * ANNUALIZATION.sqrt()
    } else {
        0.0
    }
}

pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst: f64 = 0.0;
    for &e in equity {
        peak = peak.max(e);
        if peak > 0.0 {
            worst = worst.max((peak - e) / peak);
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testutil::{predictor_only, trending, Bullish, BULLISH_CONFIDENCE};
    use chrono::Duration;
    use common::{Candle, OrderSide};
    use risk::size_position;

    fn backtester() -> Backtester {
        Backtester::new(Analyzer::default(), RiskConfig::default())
    }

    /// The first 101 trending candles, then one hourly candle per close in
    /// `path`. The backtester's first decision falls on candle 100.
    fn scripted(path: &[f64]) -> CandleSeries {
        let mut candles = trending(WARMUP_CANDLES + 1).candles().to_vec();
        let mut at = candles[WARMUP_CANDLES].timestamp;
        for (i, &close) in path.iter().enumerate() {
            at += Duration::hours(1);
            candles.push(Candle {
                timestamp: at,
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000.0 + 50.0 * (i % 3) as f64,
            });
        }
        CandleSeries::new(candles).unwrap()
    }

    fn entry_price() -> f64 {
        trending(WARMUP_CANDLES + 1).last().unwrap().close
    }

    /// Replays `path` with a predictor that always wants to buy and returns
    /// the first trade along with the candle index it closed on.
    fn first_trade(path: &[f64]) -> (ClosedTrade, usize, BacktestReport) {
        let candles = scripted(path);
        let report = Backtester::new(predictor_only(), RiskConfig::default())
            .run("BTC/USDT", &candles, Some(&Bullish))
            .unwrap();
        let trade = report.trades.first().cloned().unwrap();
        let index = candles.candles().iter().position(|c| c.timestamp == trade.exit_time).unwrap();
        (trade, index, report)
    }

    #[test]
    fn entry_is_sized_like_the_live_path() {
        let entry = entry_price();
        let (trade, _, report) = first_trade(&[entry; 5]);
        let expected =
            size_position(&RiskConfig::default(), 10_000.0, OrderSide::Buy, entry, BULLISH_CONFIDENCE).unwrap();

        assert_eq!(trade.side, OrderSide::Buy);
        assert_eq!(trade.entry_price, entry);
        assert!((trade.quantity - expected.quantity).abs() < 1e-9);
        assert_eq!(report.equity_curve[0].open_positions, 1);
        assert!((report.equity_curve[0].cash - (10_000.0 - expected.notional)).abs() < 1e-6);
    }

    #[test]
    fn take_profit_closes_on_the_first_candle_past_the_target() {
        let entry = entry_price();
        let target = size_position(&RiskConfig::default(), 10_000.0, OrderSide::Buy, entry, BULLISH_CONFIDENCE)
            .unwrap()
            .take_profit;
        let path = [entry * 1.01, entry * 1.02, target + 0.5, target + 0.5];
        let (trade, index, report) = first_trade(&path);

        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert_eq!(index, WARMUP_CANDLES + 3);
        assert_eq!(trade.exit_price, target + 0.5);
        assert!(trade.pnl > 0.0);
        // the next entry opens on the exit candle and is flattened at the end
        assert_eq!(report.trades.len(), 2);
        assert_eq!(report.trades[1].exit_reason, ExitReason::BacktestEnd);
        assert!((report.final_equity - (report.initial_capital + report.stats.total_pnl)).abs() < 1e-6);
    }

    #[test]
    fn stop_loss_closes_on_the_first_candle_through_the_stop() {
        let entry = entry_price();
        let stop = size_position(&RiskConfig::default(), 10_000.0, OrderSide::Buy, entry, BULLISH_CONFIDENCE)
            .unwrap()
            .stop_loss;
        let path = [entry * 0.995, stop - 0.5, stop - 0.5];
        let (trade, index, _) = first_trade(&path);

        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(index, WARMUP_CANDLES + 2);
        assert!(trade.pnl < 0.0);
    }

    #[test]
    fn time_limit_closes_after_max_holding_hours() {
        let entry = entry_price();
        let hours = RiskConfig::default().max_holding_hours as usize;
        let (trade, index, _) = first_trade(&vec![entry; hours + 5]);

        assert_eq!(trade.exit_reason, ExitReason::TimeLimit);
        // held strictly longer than the limit
        assert_eq!(index, WARMUP_CANDLES + hours + 1);
        assert_eq!(trade.pnl, 0.0);
    }

    #[test]
    fn short_history_is_refused() {
        let err = backtester().run("BTC/USDT", &trending(100), None).unwrap_err();
        assert!(matches!(err, Error::InsufficientHistory { needed: 101, available: 100 }));
    }

    #[test]
    fn replay_closes_everything_and_balances() {
        let candles = trending(400);
        let report = backtester().run("BTC/USDT", &candles, None).unwrap();

        assert_eq!(report.equity_curve.len(), 300);
        let last = report.equity_curve.last().unwrap();
        assert_eq!(last.open_positions, 0);
        assert_eq!(last.timestamp, candles.last().unwrap().timestamp);
        assert!((report.final_equity - (report.initial_capital + report.stats.total_pnl)).abs() < 1e-6);
        assert!((0.0..=1.0).contains(&report.max_drawdown));
        assert_eq!(report.stats.total_trades, report.trades.len());
        for trade in &report.trades {
            assert!(trade.exit_time >= trade.entry_time);
        }
    }

    #[test]
    fn replay_is_deterministic() {
        let candles = trending(300);
        let a = backtester().run("ETH/USDT", &candles, None).unwrap();
        let b = backtester().run("ETH/USDT", &candles, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn warmup_never_drops_below_indicator_needs() {
        let report = backtester().with_warmup(10).run("BTC/USDT", &trending(150), None).unwrap();
        assert_eq!(report.equity_curve.len(), 50);
        let report = backtester().with_warmup(120).run("BTC/USDT", &trending(150), None).unwrap();
        assert_eq!(report.equity_curve.len(), 30);
    }

    #[test]
    fn drawdown_is_peak_to_trough() {
        assert_eq!(max_drawdown(&[100.0, 120.0, 90.0, 130.0]), 0.25);
        assert_eq!(max_drawdown(&[100.0, 110.0, 120.0]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn sharpe_needs_variation() {
        assert_eq!(sharpe_ratio(&[100.0, 100.0, 100.0]), 0.0);
        assert_eq!(sharpe_ratio(&[100.0, 110.0]), 0.0);
        assert!(sharpe_ratio(&[100.0, 101.0, 103.0, 104.0]) > 0.0);
        assert!(sharpe_ratio(&[100.0, 99.0, 97.0, 96.0]) < 0.0);
    }
}
