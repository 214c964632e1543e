use serde::{Deserialize, Serialize};

use common::ClosedTrade;

/// Summary statistics over a closed-trade history.
///
/// `profit_factor` is `f64::INFINITY` when there are winning trades but no
/// losing ones (JSON renders it as `null`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Fraction in [0, 1].
    pub win_rate: f64,
    pub avg_win: f64,
    /// Magnitude of the average losing trade.
    pub avg_loss: f64,
    pub profit_factor: f64,
    pub total_pnl: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub avg_duration_hours: f64,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl PerformanceStats {
    pub fn from_trades(trades: &[ClosedTrade]) -> Self {
        if trades.is_empty() {
            return Self::default();
        }
        let wins: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|p| *p < 0.0).collect();
        let gross_win: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().map(|l| l.abs()).sum();
        let durations: Vec<f64> = trades.iter().map(|t| t.duration_hours).collect();

        Self {
            total_trades: trades.len(),
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate: wins.len() as f64 / trades.len() as f64,
            avg_win: mean(&wins),
            avg_loss: mean(&losses).abs(),
            profit_factor: if gross_loss > 0.0 { gross_win / gross_loss } else { f64::INFINITY },
            total_pnl: trades.iter().map(|t| t.pnl).sum(),
            best_trade: trades.iter().map(|t| t.pnl).fold(f64::NEG_INFINITY, f64::max),
            worst_trade: trades.iter().map(|t| t.pnl).fold(f64::INFINITY, f64::min),
            avg_duration_hours: mean(&durations),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use common::{ExitReason, OrderSide};

    fn trade(pnl: f64, hours: i64) -> ClosedTrade {
        let entry = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        ClosedTrade {
            position_id: "t".into(),
            symbol: "BTC/USDT".into(),
            side: OrderSide::Buy,
            entry_price: 100.0,
            exit_price: 100.0 + pnl,
            quantity: 1.0,
            pnl,
            entry_time: entry,
            exit_time: entry + Duration::hours(hours),
            duration_hours: hours as f64,
            exit_reason: ExitReason::TakeProfit,
        }
    }

    #[test]
    fn mixed_history() {
        let stats = PerformanceStats::from_trades(&[trade(30.0, 2), trade(-10.0, 4), trade(10.0, 6), trade(0.0, 0)]);
        assert_eq!(stats.total_trades, 4);
        assert_eq!(stats.winning_trades, 2);
        assert_eq!(stats.losing_trades, 1);
        assert_eq!(stats.win_rate, 0.5);
        assert_eq!(stats.avg_win, 20.0);
        assert_eq!(stats.avg_loss, 10.0);
        assert_eq!(stats.profit_factor, 4.0);
        assert_eq!(stats.total_pnl, 30.0);
        assert_eq!(stats.best_trade, 30.0);
        assert_eq!(stats.worst_trade, -10.0);
        assert_eq!(stats.avg_duration_hours, 3.0);
    }

    #[test]
    fn no_losses_is_an_infinite_profit_factor() {
        let stats = PerformanceStats::from_trades(&[trade(5.0, 1), trade(7.0, 1)]);
        assert!(stats.profit_factor.is_infinite());
        assert_eq!(serde_json::to_value(&stats).unwrap()["profit_factor"], serde_json::Value::Null);
    }

    #[test]
    fn empty_history_is_all_zero() {
        assert_eq!(PerformanceStats::from_trades(&[]), PerformanceStats::default());
    }
}
