use common::{Direction, OrderSide, StrategySignal};

/// One side must lead the other by more than this to leave HOLD.
pub const DECISION_MARGIN: f64 = 0.2;

/// A single rule firing inside a strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSignal {
    pub side: OrderSide,
    pub strength: f64,
    pub reason: String,
}

impl RuleSignal {
    pub fn buy(strength: f64, reason: impl Into<String>) -> Self {
        Self { side: OrderSide::Buy, strength, reason: reason.into() }
    }

    pub fn sell(strength: f64, reason: impl Into<String>) -> Self {
        Self { side: OrderSide::Sell, strength, reason: reason.into() }
    }
}

/// Fold the rules a strategy raised into its single output.
///
/// Both means divide by the total number of raised rules. A side wins only
/// when it leads by more than [`DECISION_MARGIN`]; otherwise the result is
/// HOLD with strength `1 − |buy − sell|`. No rules at all is HOLD at zero.
pub fn fold_signals(strategy: &str, signals: &[RuleSignal]) -> StrategySignal {
    if signals.is_empty() {
        return StrategySignal::silent(strategy);
    }

    let n = signals.len() as f64;
    let side_mean = |side: OrderSide| {
        signals.iter().filter(|s| s.side == side).map(|s| s.strength).sum::<f64>() / n
    };
    let buy = side_mean(OrderSide::Buy);
    let sell = side_mean(OrderSide::Sell);
    let reasons_for = |side: OrderSide| -> Vec<String> {
        signals.iter().filter(|s| s.side == side).map(|s| s.reason.clone()).collect()
    };

    let (direction, strength, reasons) = if buy > sell + DECISION_MARGIN {
        (Direction::Buy, buy, reasons_for(OrderSide::Buy))
    } else if sell > buy + DECISION_MARGIN {
        (Direction::Sell, sell, reasons_for(OrderSide::Sell))
    } else {
        (Direction::Hold, 1.0 - (buy - sell).abs(), vec!["conflicting signals".to_string()])
    };

    StrategySignal {
        strategy: strategy.to_string(),
        direction,
        strength: strength.clamp(0.0, 1.0),
        reasons,
        buy_strength: buy,
        sell_strength: sell,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_rules_is_silent_hold() {
        let s = fold_signals("t", &[]);
        assert_eq!(s.direction, Direction::Hold);
        assert_eq!(s.strength, 0.0);
        assert!(s.reasons.is_empty());
    }

    #[test]
    fn single_buy_wins_with_its_strength() {
        let s = fold_signals("t", &[RuleSignal::buy(0.8, "golden cross")]);
        assert_eq!(s.direction, Direction::Buy);
        assert!((s.strength - 0.8).abs() < 1e-12);
        assert_eq!(s.reasons, vec!["golden cross"]);
    }

    #[test]
    fn means_divide_by_total_count() {
        // buy mean = 0.9 / 3 = 0.3, sell mean = (0.6 + 0.6) / 3 = 0.4
        let s = fold_signals(
            "t",
            &[
                RuleSignal::buy(0.9, "a"),
                RuleSignal::sell(0.6, "b"),
                RuleSignal::sell(0.6, "c"),
            ],
        );
        assert_eq!(s.direction, Direction::Hold);
        assert!((s.buy_strength - 0.3).abs() < 1e-12);
        assert!((s.sell_strength - 0.4).abs() < 1e-12);
        assert!((s.strength - 0.9).abs() < 1e-12);
    }

    #[test]
    fn opposing_equal_rules_are_fully_balanced() {
        let s = fold_signals("t", &[RuleSignal::buy(0.7, "a"), RuleSignal::sell(0.7, "b")]);
        assert_eq!(s.direction, Direction::Hold);
        assert!((s.strength - 1.0).abs() < 1e-12);
    }
}
