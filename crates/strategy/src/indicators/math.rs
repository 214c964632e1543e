//! Rolling-window primitives shared by the indicator groups.
//!
//! Every function returns a column aligned 1:1 with its input, with `None`
//! wherever the window is not yet full.

use super::{IndicatorError, Series};

pub(crate) fn check(len: usize, period: usize) -> Result<(), IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod(period));
    }
    if len < period {
        return Err(IndicatorError::InsufficientHistory { needed: period, available: len });
    }
    Ok(())
}

/// Lift a raw column, treating non-finite values as missing.
pub fn lift(values: &[f64]) -> Series {
    values.iter().map(|v| v.is_finite().then_some(*v)).collect()
}

/// Apply `f` to each complete window of `period` defined values.
pub fn rolling<F>(series: &[Option<f64>], period: usize, f: F) -> Result<Series, IndicatorError>
where
    F: Fn(&[f64]) -> f64,
{
    check(series.len(), period)?;
    let mut window = Vec::with_capacity(period);
    Ok((0..series.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            window.clear();
            for v in &series[i + 1 - period..=i] {
                window.push((*v)?);
            }
            let out = f(&window);
            out.is_finite().then_some(out)
        })
        .collect())
}

pub fn sma(series: &[Option<f64>], period: usize) -> Result<Series, IndicatorError> {
    rolling(series, period, mean)
}

/// Exponential moving average seeded with the SMA of the first full window.
pub fn ema(series: &[Option<f64>], period: usize) -> Result<Series, IndicatorError> {
    smoothed(series, period, 2.0 / (period as f64 + 1.0))
}

/// Wilder's smoothing (RMA): `avg = (prev * (n - 1) + x) / n`, SMA seeded.
pub fn wilder(series: &[Option<f64>], period: usize) -> Result<Series, IndicatorError> {
    smoothed(series, period, 1.0 / period as f64)
}

fn smoothed(series: &[Option<f64>], period: usize, alpha: f64) -> Result<Series, IndicatorError> {
    check(series.len(), period)?;
    let mut out = Vec::with_capacity(series.len());
    let mut prev: Option<f64> = None;
    let mut run = 0usize;

    for (i, value) in series.iter().enumerate() {
        let Some(x) = *value else {
            // a gap restarts the seed
            prev = None;
            run = 0;
            out.push(None);
            continue;
        };
        run += 1;
        let next = match prev {
            Some(p) => Some(alpha * x + (1.0 - alpha) * p),
            None if run >= period => {
                let seed: f64 = series[i + 1 - period..=i].iter().flatten().sum::<f64>();
                Some(seed / period as f64)
            }
            None => None,
        };
        prev = next;
        out.push(next);
    }
    Ok(out)
}

pub fn rolling_max(series: &[Option<f64>], period: usize) -> Result<Series, IndicatorError> {
    rolling(series, period, |w| w.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

pub fn rolling_min(series: &[Option<f64>], period: usize) -> Result<Series, IndicatorError> {
    rolling(series, period, |w| w.iter().copied().fold(f64::INFINITY, f64::min))
}

pub fn mean(w: &[f64]) -> f64 {
    if w.is_empty() {
        return f64::NAN;
    }
    w.iter().sum::<f64>() / w.len() as f64
}

/// Population standard deviation (ddof = 0).
pub fn population_std(w: &[f64]) -> f64 {
    let m = mean(w);
    (w.iter().map(|x| (x - m).powi(2)).sum::<f64>() / w.len() as f64).sqrt()
}

/// Sample standard deviation (ddof = 1).
pub fn sample_std(w: &[f64]) -> f64 {
    if w.len() < 2 {
        return f64::NAN;
    }
    let m = mean(w);
    (w.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (w.len() - 1) as f64).sqrt()
}

/// Fractional change over `lag` rows: `x[i] / x[i - lag] - 1`.
pub fn pct_change(values: &[f64], lag: usize) -> Result<Series, IndicatorError> {
    check(values.len(), lag + 1)?;
    Ok((0..values.len())
        .map(|i| {
            if i < lag || values[i - lag] == 0.0 {
                return None;
            }
            let v = values[i] / values[i - lag] - 1.0;
            v.is_finite().then_some(v)
        })
        .collect())
}

/// Combine two aligned columns element-wise where both are defined.
pub fn zip_with<F>(a: &[Option<f64>], b: &[Option<f64>], f: F) -> Series
where
    F: Fn(f64, f64) -> Option<f64>,
{
    a.iter()
        .zip(b)
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => f(*x, *y).filter(|v| v.is_finite()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.map(|a| (a - b).abs() < 1e-9).unwrap_or(false)
    }

    #[test]
    fn sma_warms_up_then_averages() {
        let s = sma(&lift(&[1.0, 2.0, 3.0, 4.0]), 3).unwrap();
        assert_eq!(s[0], None);
        assert_eq!(s[1], None);
        assert!(approx(s[2], 2.0));
        assert!(approx(s[3], 3.0));
    }

    #[test]
    fn ema_is_seeded_with_sma() {
        let s = ema(&lift(&[2.0, 4.0, 6.0, 8.0]), 3).unwrap();
        assert_eq!(s[1], None);
        assert!(approx(s[2], 4.0));
        // k = 0.5
        assert!(approx(s[3], 6.0));
    }

    #[test]
    fn wilder_uses_one_over_period() {
        let s = wilder(&lift(&[1.0, 1.0, 4.0]), 2).unwrap();
        assert!(approx(s[1], 1.0));
        assert!(approx(s[2], 2.5));
    }

    #[test]
    fn smoothing_skips_leading_gaps() {
        let s = ema(&[None, None, Some(1.0), Some(3.0), Some(5.0)], 2).unwrap();
        assert_eq!(s[2], None);
        assert!(approx(s[3], 2.0));
    }

    #[test]
    fn short_input_is_insufficient_history() {
        assert_eq!(
            sma(&lift(&[1.0]), 5),
            Err(IndicatorError::InsufficientHistory { needed: 5, available: 1 })
        );
        assert_eq!(sma(&lift(&[1.0]), 0), Err(IndicatorError::InvalidPeriod(0)));
    }

    #[test]
    fn pct_change_lags() {
        let s = pct_change(&[100.0, 110.0, 121.0], 1).unwrap();
        assert_eq!(s[0], None);
        assert!(approx(s[1], 0.1));
        assert!(approx(s[2], 0.1));
    }

    #[test]
    fn std_variants() {
        let w = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((population_std(&w) - 2.0).abs() < 1e-12);
        assert!((sample_std(&w) - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }
}
