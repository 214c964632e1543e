use common::Candle;

use super::math::{self, lift, zip_with};
use super::{Indicator, IndicatorError, IndicatorFrame, Series};
use crate::config::{IndicatorConfig, MacdParams};

pub const ADX_PERIOD: usize = 14;

pub(crate) fn add(frame: &mut IndicatorFrame, config: &IndicatorConfig) {
    let closes = lift(&frame.series().closes());

    for (indicator, period) in [
        (Indicator::Sma20, 20),
        (Indicator::Sma50, 50),
        (Indicator::Sma200, 200),
    ] {
        frame.absorb(indicator, math::sma(&closes, period));
    }
    for (indicator, period) in [
        (Indicator::Ema9, 9),
        (Indicator::Ema21, 21),
        (Indicator::Ema55, 55),
    ] {
        frame.absorb(indicator, math::ema(&closes, period));
    }

    match macd(&closes, &config.macd) {
        Ok(m) => {
            frame.insert(Indicator::Macd, m.line);
            frame.insert(Indicator::MacdSignal, m.signal);
            frame.insert(Indicator::MacdDiff, m.histogram);
        }
        Err(e) => {
            frame.absorb(Indicator::Macd, Err(e.clone()));
            frame.absorb(Indicator::MacdSignal, Err(e.clone()));
            frame.absorb(Indicator::MacdDiff, Err(e));
        }
    }

    match adx(frame.candles(), ADX_PERIOD) {
        Ok(a) => {
            frame.insert(Indicator::Adx, a.adx);
            frame.insert(Indicator::AdxPos, a.plus_di);
            frame.insert(Indicator::AdxNeg, a.minus_di);
        }
        Err(e) => {
            frame.absorb(Indicator::Adx, Err(e.clone()));
            frame.absorb(Indicator::AdxPos, Err(e.clone()));
            frame.absorb(Indicator::AdxNeg, Err(e));
        }
    }
}

#[derive(Debug, Clone)]
pub struct MacdColumns {
    pub line: Series,
    pub signal: Series,
    pub histogram: Series,
}

/// MACD line = EMA(fast) − EMA(slow); signal = EMA(line, signal); histogram = line − signal.
pub fn macd(closes: &[Option<f64>], params: &MacdParams) -> Result<MacdColumns, IndicatorError> {
    if params.fast >= params.slow {
        return Err(IndicatorError::InvalidPeriod(params.fast));
    }
    math::check(closes.len(), params.slow + params.signal - 1)?;
    let fast = math::ema(closes, params.fast)?;
    let slow = math::ema(closes, params.slow)?;
    let line = zip_with(&fast, &slow, |f, s| Some(f - s));
    let signal = math::ema(&line, params.signal)?;
    let histogram = zip_with(&line, &signal, |l, s| Some(l - s));
    Ok(MacdColumns { line, signal, histogram })
}

#[derive(Debug, Clone)]
pub struct AdxColumns {
    pub adx: Series,
    pub plus_di: Series,
    pub minus_di: Series,
}

/// Wilder's ADX with its directional indicators.
pub fn adx(candles: &[Candle], period: usize) -> Result<AdxColumns, IndicatorError> {
    math::check(candles.len(), 2 * period)?;

    // Movement terms start at row 1; row 0 has no predecessor.
    let mut tr = vec![None];
    let mut plus_dm = vec![None];
    let mut minus_dm = vec![None];
    for w in candles.windows(2) {
        let (prev, cur) = (&w[0], &w[1]);
        tr.push(Some(true_range(cur, prev.close)));
        let up = cur.high - prev.high;
        let down = prev.low - cur.low;
        plus_dm.push(Some(if up > down && up > 0.0 { up } else { 0.0 }));
        minus_dm.push(Some(if down > up && down > 0.0 { down } else { 0.0 }));
    }

    let tr_s = math::wilder(&tr, period)?;
    let plus_s = math::wilder(&plus_dm, period)?;
    let minus_s = math::wilder(&minus_dm, period)?;

    let di = |dm: f64, tr: f64| Some(if tr > 0.0 { 100.0 * dm / tr } else { 0.0 });
    let plus_di = zip_with(&plus_s, &tr_s, di);
    let minus_di = zip_with(&minus_s, &tr_s, di);
    let dx = zip_with(&plus_di, &minus_di, |p, m| {
        Some(if p + m > 0.0 { 100.0 * (p - m).abs() / (p + m) } else { 0.0 })
    });
    let adx = math::wilder(&dx, period)?;

    Ok(AdxColumns { adx, plus_di, minus_di })
}

pub(crate) fn true_range(cur: &Candle, prev_close: f64) -> f64 {
    (cur.high - cur.low)
        .max((cur.high - prev_close).abs())
        .max((cur.low - prev_close).abs())
}
