use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// Tunable indicator periods (TOML).
///
/// Example `config/indicators.toml`:
/// ```toml
/// [rsi]
/// period = 14
/// overbought = 70.0
/// oversold = 30.0
///
/// [macd]
/// fast = 12
/// slow = 26
/// signal = 9
///
/// [bollinger]
/// period = 20
/// std_dev = 2.0
/// ```
/// Any omitted table or key keeps its default.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi: RsiParams,
    pub macd: MacdParams,
    pub bollinger: BollingerParams,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RsiParams {
    pub period: usize,
    pub overbought: f64,
    pub oversold: f64,
}

impl Default for RsiParams {
    fn default() -> Self {
        Self { period: 14, overbought: 70.0, oversold: 30.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MacdParams {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self { fast: 12, slow: 26, signal: 9 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BollingerParams {
    pub period: usize,
    pub std_dev: f64,
}

impl Default for BollingerParams {
    fn default() -> Self {
        Self { period: 20, std_dev: 2.0 }
    }
}

impl IndicatorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let cfg: IndicatorConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid indicator config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read indicator config at '{path}': {e}")))?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rsi.period < 2 {
            return Err(Error::Config("RSI period must be >= 2".into()));
        }
        if self.rsi.oversold >= self.rsi.overbought {
            return Err(Error::Config("RSI oversold must be below overbought".into()));
        }
        if self.macd.fast == 0 || self.macd.fast >= self.macd.slow || self.macd.signal == 0 {
            return Err(Error::Config(
                "MACD periods must satisfy 0 < fast < slow and signal > 0".into(),
            ));
        }
        if self.bollinger.period < 2 || self.bollinger.std_dev <= 0.0 {
            return Err(Error::Config("Bollinger period must be >= 2 with positive std_dev".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = IndicatorConfig::from_toml("[rsi]\nperiod = 10\n").unwrap();
        assert_eq!(cfg.rsi.period, 10);
        assert_eq!(cfg.rsi.overbought, 70.0);
        assert_eq!(cfg.macd, MacdParams::default());
        assert_eq!(cfg.bollinger.period, 20);
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(IndicatorConfig::from_toml("").unwrap(), IndicatorConfig::default());
    }

    #[test]
    fn inverted_macd_periods_are_rejected() {
        let err = IndicatorConfig::from_toml("[macd]\nfast = 26\nslow = 12\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_is_config_error() {
        assert!(matches!(
            IndicatorConfig::load("/nonexistent/indicators.toml"),
            Err(Error::Config(_))
        ));
    }
}
