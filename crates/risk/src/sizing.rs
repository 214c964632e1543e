use serde::{Deserialize, Serialize};

use common::{OrderSide, SizingMethod};

use crate::RiskConfig;

/// Heuristic constants of the Kelly sizing path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KellyParams {
    /// How much of the distance from 0.5 a decision's confidence keeps
    /// when read as a win probability.
    pub win_damping: f64,
    /// Assumed reward:risk; the take-profit sits this many stop distances away.
    pub reward_risk: f64,
    /// Upper clamp on the Kelly fraction.
    pub max_fraction: f64,
}

impl Default for KellyParams {
    fn default() -> Self {
        Self { win_damping: 0.8, reward_risk: 3.0, max_fraction: 0.25 }
    }
}

impl KellyParams {
    pub fn win_probability(&self, confidence: f64) -> f64 {
        0.5 + (confidence - 0.5) * self.win_damping
    }

    /// `(b·p − q) / b`, clamped to `[0, max_fraction]`.
    pub fn fraction(&self, confidence: f64) -> f64 {
        let p = self.win_probability(confidence);
        let b = self.reward_risk;
        if b <= 0.0 {
            return 0.0;
        }
        ((b * p - (1.0 - p)) / b).clamp(0.0, self.max_fraction)
    }
}

/// Notional may not exceed this share of available capital.
pub const MAX_CAPITAL_FRACTION: f64 = 0.95;
/// Positions worth less than this share of available capital are not opened.
pub const MIN_POSITION_FRACTION: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSize {
    pub quantity: f64,
    pub notional: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Zero on the fixed-fraction path.
    pub kelly_fraction: f64,
    pub win_probability: f64,
    /// Loss if the stop is hit.
    pub risk_amount: f64,
}

fn levels(side: OrderSide, price: f64, stop_pct: f64, target_pct: f64) -> (f64, f64) {
    match side {
        OrderSide::Buy => (price * (1.0 - stop_pct), price * (1.0 + target_pct)),
        OrderSide::Sell => (price * (1.0 + stop_pct), price * (1.0 - target_pct)),
    }
}

/// Size a new position against `capital`, or `None` if it would be too
/// small to open (including zero Kelly edge).
pub fn size_position(
    config: &RiskConfig,
    capital: f64,
    side: OrderSide,
    price: f64,
    confidence: f64,
) -> Option<PositionSize> {
    if !(price.is_finite() && price > 0.0 && capital.is_finite() && capital > 0.0) {
        return None;
    }
    let confidence = confidence.clamp(0.0, 1.0);
    let sl = config.stop_loss_pct;

    let (mut quantity, kelly_fraction, win_probability, (stop_loss, take_profit)) = match config.sizing_method {
        SizingMethod::Fixed => (
            capital * config.position_size_pct / price,
            0.0,
            confidence,
            levels(side, price, sl, config.take_profit_pct),
        ),
        SizingMethod::Kelly => {
            let kelly = config.kelly.fraction(confidence);
            let kelly_size = capital * kelly / price;
            let risk_size = capital * config.max_portfolio_risk / (price * sl);
            (
                kelly_size.min(risk_size) * confidence,
                kelly,
                config.kelly.win_probability(confidence),
                levels(side, price, sl, sl * config.kelly.reward_risk),
            )
        }
    };

    if quantity * price > capital * MAX_CAPITAL_FRACTION {
        quantity = capital * MAX_CAPITAL_FRACTION / price;
    }
    let notional = quantity * price;
    if !(notional.is_finite() && quantity > 0.0) || notional < capital * MIN_POSITION_FRACTION {
        return None;
    }

    Some(PositionSize {
        quantity,
        notional,
        stop_loss,
        take_profit,
        kelly_fraction,
        win_probability,
        risk_amount: (price - stop_loss).abs() * quantity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed() -> RiskConfig {
        RiskConfig {
            sizing_method: SizingMethod::Fixed,
            position_size_pct: 0.15,
            stop_loss_pct: 0.04,
            take_profit_pct: 0.10,
            ..RiskConfig::default()
        }
    }

    #[test]
    fn fixed_fraction_scenario() {
        let size = size_position(&fixed(), 10_000.0, OrderSide::Buy, 50_000.0, 0.8).unwrap();
        assert!((size.notional - 1500.0).abs() < 1e-9);
        assert!((size.quantity - 0.03).abs() < 1e-12);
        assert!((size.stop_loss - 48_000.0).abs() < 1e-9);
        assert!((size.take_profit - 55_000.0).abs() < 1e-9);
    }

    #[test]
    fn short_levels_are_mirrored() {
        let size = size_position(&fixed(), 10_000.0, OrderSide::Sell, 50_000.0, 0.8).unwrap();
        assert!((size.stop_loss - 52_000.0).abs() < 1e-9);
        assert!((size.take_profit - 45_000.0).abs() < 1e-9);
    }

    #[test]
    fn kelly_fraction_is_damped_and_capped() {
        let k = KellyParams::default();
        assert!((k.win_probability(0.75) - 0.7).abs() < 1e-12);
        // p = 0.4 at 3:1 gives (1.2 - 0.6) / 3
        assert!((k.fraction(0.375) - 0.2).abs() < 1e-12);
        assert_eq!(k.fraction(1.0), 0.25);
        assert_eq!(k.fraction(0.0), 0.0);
    }

    #[test]
    fn kelly_path_takes_the_smaller_of_kelly_and_risk_budget() {
        let config = RiskConfig { stop_loss_pct: 0.015, max_portfolio_risk: 0.015, ..RiskConfig::default() };
        let size = size_position(&config, 10_000.0, OrderSide::Buy, 50_000.0, 0.7).unwrap();
        // kelly capped at 0.25 -> 0.05 units; risk budget allows 0.2 units
        assert!((size.quantity - 0.05 * 0.7).abs() < 1e-12);
        assert_eq!(size.kelly_fraction, 0.25);
        assert!((size.stop_loss - 49_250.0).abs() < 1e-9);
        assert!((size.take_profit - 52_250.0).abs() < 1e-9);
        assert!((size.risk_amount - 750.0 * 0.035).abs() < 1e-9);
    }

    #[test]
    fn tiny_positions_are_rejected() {
        let config = RiskConfig { max_portfolio_risk: 0.00001, ..RiskConfig::default() };
        assert!(size_position(&config, 10_000.0, OrderSide::Buy, 50_000.0, 0.9).is_none());
        assert!(size_position(&RiskConfig::default(), 10_000.0, OrderSide::Buy, 0.0, 0.9).is_none());
    }

    #[test]
    fn notional_is_capped_below_capital() {
        let config = RiskConfig { position_size_pct: 2.0, ..fixed() };
        let size = size_position(&config, 1000.0, OrderSide::Buy, 10.0, 0.9).unwrap();
        assert!((size.notional - 950.0).abs() < 1e-9);
    }
}
