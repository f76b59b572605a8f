use tracing::debug;

use common::{Error, Result};

use crate::config::{AdaptiveConfig, StrategyConfig};
use crate::series::SeriesStore;

use super::{IndicatorSet, MaKey, RegimeParams, RollingMean};

/// Owns every configured moving-average column plus the regime bands, and
/// keeps them aligned 1:1 with a `SeriesStore`.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    /// One rolling mean per `MaKey`, in `MaKey::ALL` order.
    averages: Vec<RollingMean>,
    adaptive: AdaptiveConfig,
    regime: RegimeParams,
}

impl IndicatorEngine {
    pub fn new(cfg: &StrategyConfig) -> Self {
        let decimals = cfg.round_prices.then_some(cfg.price_precision);
        let averages = MaKey::ALL
            .iter()
            .map(|&key| RollingMean::new(cfg.windows.get(key), decimals))
            .collect();
        Self {
            averages,
            adaptive: cfg.adaptive.clone(),
            regime: RegimeParams::non_adaptive(),
        }
    }

    /// Rebuild every column and the regime bands from the whole series.
    pub fn recompute_all(&mut self, series: &SeriesStore) {
        for ma in &mut self.averages {
            ma.recompute(series.closes());
        }
        self.refresh_regime(series);
    }

    /// Extend every column by the newest interval of `series`, which must be
    /// exactly one interval longer than the columns. Rebuilds from scratch
    /// when the lengths do not line up.
    pub fn append_incremental(&mut self, series: &SeriesStore) {
        if series.len() != self.len() + 1 {
            debug!(
                series_len = series.len(),
                columns_len = self.len(),
                "Column length mismatch on append, rebuilding indicators"
            );
            self.recompute_all(series);
            return;
        }
        for ma in &mut self.averages {
            ma.push(series.closes());
        }
        self.refresh_regime(series);
    }

    /// Recompute only the newest value after `SeriesStore::replace_last`.
    pub fn replace_last_incremental(&mut self, series: &SeriesStore) {
        if series.is_empty() || series.len() != self.len() {
            debug!(
                series_len = series.len(),
                columns_len = self.len(),
                "Column length mismatch on replace, rebuilding indicators"
            );
            self.recompute_all(series);
            return;
        }
        for ma in &mut self.averages {
            ma.replace_last(series.closes());
        }
        self.refresh_regime(series);
    }

    fn refresh_regime(&mut self, series: &SeriesStore) {
        self.regime = RegimeParams::compute(series.highs(), series.lows(), &self.adaptive);
    }

    /// Column length, equal to the series length after any refresh.
    pub fn len(&self) -> usize {
        self.averages.first().map(RollingMean::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn indicators(&self) -> IndicatorSet<'_> {
        IndicatorSet::from_columns([
            self.averages[0].values(),
            self.averages[1].values(),
            self.averages[2].values(),
            self.averages[3].values(),
            self.averages[4].values(),
            self.averages[5].values(),
        ])
    }

    pub fn column(&self, key: MaKey) -> &[f64] {
        self.indicators().column(key)
    }

    pub fn regime(&self) -> RegimeParams {
        self.regime
    }

    pub fn largest_window(&self) -> usize {
        self.averages.iter().map(RollingMean::window).max().unwrap_or(0)
    }

    /// Err when some average has no value yet at the newest index.
    /// Rules simply report false in that case; this exists for diagnostics.
    pub fn check_warm(&self) -> Result<()> {
        let required = self.largest_window();
        let available = self.len();
        if available < required {
            return Err(Error::IndicatorUnderflow {
                required,
                available,
            });
        }
        Ok(())
    }
}
