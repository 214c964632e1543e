use common::Candle;

use super::math::{self, lift, zip_with};
use super::{Indicator, IndicatorError, IndicatorFrame, Series};
use crate::config::IndicatorConfig;

pub const STOCH_PERIOD: usize = 14;
pub const STOCH_SMOOTH: usize = 3;
pub const ROC_PERIOD: usize = 12;
pub const WILLIAMS_PERIOD: usize = 14;

pub(crate) fn add(frame: &mut IndicatorFrame, config: &IndicatorConfig) {
    let closes = frame.series().closes();

    frame.absorb(Indicator::Rsi, rsi(&closes, config.rsi.period));

    match stochastic(frame.candles(), STOCH_PERIOD, STOCH_SMOOTH) {
        Ok((k, d)) => {
            frame.insert(Indicator::StochK, k);
            frame.insert(Indicator::StochD, d);
        }
        Err(e) => {
            frame.absorb(Indicator::StochK, Err(e.clone()));
            frame.absorb(Indicator::StochD, Err(e));
        }
    }

    let roc = math::pct_change(&closes, ROC_PERIOD)
        .map(|s| s.into_iter().map(|v| v.map(|x| x * 100.0)).collect());
    frame.absorb(Indicator::Roc, roc);
    frame.absorb(Indicator::WilliamsR, williams_r(frame.candles(), WILLIAMS_PERIOD));
}

/// RSI column using Wilder's smoothed averages of gains and losses.
///
/// The first value appears at row `period` (it needs `period` changes).
pub fn rsi(closes: &[f64], period: usize) -> Result<Series, IndicatorError> {
    if period < 2 {
        return Err(IndicatorError::InvalidPeriod(period));
    }
    math::check(closes.len(), period + 1)?;

    let mut gains = vec![None];
    let mut losses = vec![None];
    for w in closes.windows(2) {
        let change = w[1] - w[0];
        gains.push(Some(change.max(0.0)));
        losses.push(Some((-change).max(0.0)));
    }

    let avg_gain = math::wilder(&gains, period)?;
    let avg_loss = math::wilder(&losses, period)?;

    Ok(zip_with(&avg_gain, &avg_loss, |g, l| {
        Some(match (g, l) {
            // no movement at all
            (g, l) if g == 0.0 && l == 0.0 => 50.0,
            (_, l) if l == 0.0 => 100.0,
            (g, l) => 100.0 - 100.0 / (1.0 + g / l),
        })
    }))
}

/// Stochastic oscillator: %K over `period` rows and %D as its `smooth`-row SMA.
pub fn stochastic(
    candles: &[Candle],
    period: usize,
    smooth: usize,
) -> Result<(Series, Series), IndicatorError> {
    math::check(candles.len(), period + smooth - 1)?;
    let (highest, lowest) = high_low_channel(candles, period)?;
    let closes: Series = candles.iter().map(|c| Some(c.close)).collect();

    let k: Series = closes
        .iter()
        .zip(highest.iter().zip(&lowest))
        .map(|(c, (h, l))| match (c, h, l) {
            (Some(c), Some(h), Some(l)) if h > l => Some(100.0 * (c - l) / (h - l)),
            _ => None,
        })
        .collect();
    let d = math::sma(&k, smooth)?;
    Ok((k, d))
}

/// Williams %R: `(highest − close) / (highest − lowest) × −100`.
pub fn williams_r(candles: &[Candle], period: usize) -> Result<Series, IndicatorError> {
    let (highest, lowest) = high_low_channel(candles, period)?;
    Ok(candles
        .iter()
        .zip(highest.iter().zip(&lowest))
        .map(|(c, (h, l))| match (h, l) {
            (Some(h), Some(l)) if h > l => Some((h - c.close) / (h - l) * -100.0),
            _ => None,
        })
        .collect())
}

pub(crate) fn high_low_channel(
    candles: &[Candle],
    period: usize,
) -> Result<(Series, Series), IndicatorError> {
    let highs = lift(&candles.iter().map(|c| c.high).collect::<Vec<_>>());
    let lows = lift(&candles.iter().map(|c| c.low).collect::<Vec<_>>());
    Ok((math::rolling_max(&highs, period)?, math::rolling_min(&lows, period)?))
}
