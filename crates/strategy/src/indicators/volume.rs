use common::Candle;

use super::math::{self, lift};
use super::{Indicator, IndicatorError, IndicatorFrame, Series};

pub const VWAP_WINDOW: usize = 14;
pub const VOLUME_SMA_PERIOD: usize = 20;

pub(crate) fn add(frame: &mut IndicatorFrame) {
    frame.absorb(Indicator::Obv, obv(frame.candles()));
    frame.absorb(Indicator::Vwap, vwap(frame.candles(), VWAP_WINDOW));

    let volumes = lift(&frame.candles().iter().map(|c| c.volume).collect::<Vec<_>>());
    frame.absorb(Indicator::VolumeSma, math::sma(&volumes, VOLUME_SMA_PERIOD));
}

/// On-balance volume, starting at zero on the first row.
pub fn obv(candles: &[Candle]) -> Result<Series, IndicatorError> {
    math::check(candles.len(), 1)?;
    let mut total = 0.0;
    let mut out = Vec::with_capacity(candles.len());
    out.push(Some(total));
    for w in candles.windows(2) {
        if w[1].close > w[0].close {
            total += w[1].volume;
        } else if w[1].close < w[0].close {
            total -= w[1].volume;
        }
        out.push(Some(total));
    }
    Ok(out)
}

/// Rolling volume-weighted average of the typical price `(h + l + c) / 3`.
pub fn vwap(candles: &[Candle], window: usize) -> Result<Series, IndicatorError> {
    let pv = lift(
        &candles
            .iter()
            .map(|c| (c.high + c.low + c.close) / 3.0 * c.volume)
            .collect::<Vec<_>>(),
    );
    let vol = lift(&candles.iter().map(|c| c.volume).collect::<Vec<_>>());
    let pv_sum = math::rolling(&pv, window, |w| w.iter().sum())?;
    let vol_sum = math::rolling(&vol, window, |w| w.iter().sum())?;
    Ok(math::zip_with(&pv_sum, &vol_sum, |p, v| (v > 0.0).then(|| p / v)))
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;

    #[test]
    fn obv_accumulates_signed_volume() {
        let series = series_with_volume(&[10.0, 11.0, 10.5, 10.5, 12.0], &[5.0, 1.0, 2.0, 3.0, 4.0]);
        let col = obv(series.candles()).unwrap();
        let values: Vec<f64> = col.into_iter().flatten().collect();
        assert_eq!(values, vec![0.0, 1.0, -1.0, -1.0, 3.0]);
    }

    #[test]
    fn vwap_of_flat_prices_is_the_typical_price() {
        let series = series_with_volume(&[100.0; 20], &[3.0; 20]);
        let col = vwap(series.candles(), VWAP_WINDOW).unwrap();
        assert!(col[12].is_none());
        let typical = (101.0 + 99.0 + 100.0) / 3.0;
        assert!((col[19].unwrap() - typical).abs() < 1e-9);
    }

    #[test]
    fn vwap_without_volume_is_missing() {
        let series = series_with_volume(&[100.0; 20], &[0.0; 20]);
        let col = vwap(series.candles(), VWAP_WINDOW).unwrap();
        assert!(col.iter().all(Option::is_none));
    }
}
