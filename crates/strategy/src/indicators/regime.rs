use crate::config::{AdaptiveConfig, RangeStatistic};

/// Series-wide volatility figures that widen or narrow the rule bands.
///
/// `candle_range` summarises `high / low` over every interval;
/// `allowance = (candle_range^0.5 - 1) / divisor` is Rule 2's retest band;
/// `deviance = (candle_range - 1) * multiplier + 1` caps how far price may sit
/// from the mid MA on Rule 1/3 entries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeParams {
    pub candle_range: f64,
    pub allowance: f64,
    /// `None` disables the deviance clause.
    pub deviance: Option<f64>,
}

impl Default for RegimeParams {
    fn default() -> Self {
        Self::non_adaptive()
    }
}

impl RegimeParams {
    pub fn non_adaptive() -> Self {
        Self {
            candle_range: f64::NAN,
            allowance: 0.0,
            deviance: None,
        }
    }

    pub fn compute(highs: &[f64], lows: &[f64], cfg: &AdaptiveConfig) -> Self {
        if !cfg.enabled {
            return Self::non_adaptive();
        }

        let ratios: Vec<f64> = highs
            .iter()
            .zip(lows)
            .map(|(h, l)| h / l)
            .filter(|r| r.is_finite())
            .collect();
        if ratios.is_empty() {
            return Self::non_adaptive();
        }

        let candle_range = match cfg.statistic {
            RangeStatistic::Mean => ratios.iter().sum::<f64>() / ratios.len() as f64,
            RangeStatistic::Median => median(ratios),
        };

        Self {
            candle_range,
            allowance: (candle_range.sqrt() - 1.0) / cfg.allowance_divisor,
            deviance: Some((candle_range - 1.0) * cfg.deviance_multiplier + 1.0),
        }
    }

    /// True when `ratio` is inside the deviance band (always, when disabled).
    pub fn within_deviance(&self, ratio: f64) -> bool {
        match self.deviance {
            Some(limit) => ratio < limit,
            None => !ratio.is_nan(),
        }
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}
