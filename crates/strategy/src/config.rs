use serde::{Deserialize, Serialize};

use common::{Error, Result};

use crate::indicators::MaKey;

/// Strategy config file (TOML). Every key is optional.
///
/// Example `config/strategy.toml`:
/// ```toml
/// price_precision = 2
/// incremental = true
///
/// [windows]
/// short = 7
/// mid = 77
/// long = 231
///
/// [adaptive]
/// enabled = true
/// statistic = "mean"
///
/// [rule2]
/// variant = "basic"
/// stop = "crossover"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub windows: WindowConfig,
    /// Round moving averages to `price_precision` decimals.
    pub round_prices: bool,
    /// Decimal places matching the instrument's price tick.
    pub price_precision: u32,
    pub adaptive: AdaptiveConfig,
    pub rule2: Rule2Config,
    /// Use the running-sum fast path on partial ticks instead of a full rebuild.
    pub incremental: bool,
    /// Extra intervals fetched beyond the largest window at startup.
    pub warmup_padding: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            windows: WindowConfig::default(),
            round_prices: true,
            price_precision: 2,
            adaptive: AdaptiveConfig::default(),
            rule2: Rule2Config::default(),
            incremental: true,
            warmup_padding: 4,
        }
    }
}

/// Moving-average window sizes, in intervals.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowConfig {
    pub short: usize,
    pub mid: usize,
    pub long: usize,
    pub filter1: usize,
    pub filter2: usize,
    pub filter3: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            short: 7,
            mid: 77,
            long: 231,
            filter1: 200,
            filter2: 279,
            filter3: 100,
        }
    }
}

impl WindowConfig {
    pub fn get(&self, key: MaKey) -> usize {
        match key {
            MaKey::Short => self.short,
            MaKey::Mid => self.mid,
            MaKey::Long => self.long,
            MaKey::Filter1 => self.filter1,
            MaKey::Filter2 => self.filter2,
            MaKey::Filter3 => self.filter3,
        }
    }

    pub fn largest(&self) -> usize {
        MaKey::ALL.iter().map(|&k| self.get(k)).max().unwrap_or(0)
    }
}

/// Statistic used to summarise per-candle high/low ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeStatistic {
    Mean,
    Median,
}

/// Volatility-scaled sensitivity bands.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// When false, allowance is 0 and the deviance clause always passes.
    pub enabled: bool,
    pub statistic: RangeStatistic,
    pub allowance_divisor: f64,
    pub deviance_multiplier: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            statistic: RangeStatistic::Mean,
            allowance_divisor: 5.0,
            deviance_multiplier: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Rule2Variant {
    /// Long-MA retest with slope confirmation.
    #[default]
    Basic,
    /// Basic plus filter2/filter1 regime ordering and price placement.
    Filtered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Rule2Stop {
    /// Qualify on the prior bar, trigger on the current one.
    #[default]
    Crossover,
    /// Fire whenever the short MA is on the wrong side of the long MA.
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Rule2Config {
    pub variant: Rule2Variant,
    pub stop: Rule2Stop,
}

impl StrategyConfig {
    /// Load and validate a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read strategy config at '{path}': {e}"))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("Invalid strategy config at '{path}': {e}")))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: StrategyConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        for key in MaKey::ALL {
            if self.windows.get(key) == 0 {
                return Err(Error::Config(format!("window '{key}' must be at least 1")));
            }
        }
        let w = &self.windows;
        if !(w.short < w.mid && w.mid < w.long) {
            return Err(Error::Config(format!(
                "windows must satisfy short < mid < long, got {} / {} / {}",
                w.short, w.mid, w.long
            )));
        }
        if self.adaptive.allowance_divisor == 0.0 {
            return Err(Error::Config("adaptive.allowance_divisor must be non-zero".into()));
        }
        Ok(())
    }

    /// Intervals needed before every moving average has a value, plus padding.
    pub fn warmup_len(&self) -> usize {
        self.windows.largest() + self.warmup_padding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = StrategyConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, StrategyConfig::default());
        assert_eq!(cfg.windows.largest(), 279);
        assert_eq!(cfg.warmup_len(), 283);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let cfg = StrategyConfig::from_toml_str(
            r#"
            price_precision = 1
            [windows]
            long = 150
            [adaptive]
            statistic = "median"
            [rule2]
            stop = "absolute"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.price_precision, 1);
        assert_eq!(cfg.windows.long, 150);
        assert_eq!(cfg.windows.short, 7);
        assert_eq!(cfg.adaptive.statistic, RangeStatistic::Median);
        assert!(cfg.adaptive.enabled);
        assert_eq!(cfg.rule2.stop, Rule2Stop::Absolute);
        assert_eq!(cfg.rule2.variant, Rule2Variant::Basic);
    }

    #[test]
    fn misordered_windows_rejected() {
        let err = StrategyConfig::from_toml_str("[windows]\nmid = 300\n").unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("short < mid < long")));
        assert!(StrategyConfig::from_toml_str("[windows]\nshort = 77\n").is_err());
    }

    #[test]
    fn zero_window_rejected() {
        let err = StrategyConfig::from_toml_str("[windows]\nshort = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
