pub mod config;
pub mod indicators;
pub mod priority;
pub mod rules;
pub mod series;

pub use config::StrategyConfig;
pub use indicators::{IndicatorEngine, IndicatorSet, MaKey, RegimeParams};
pub use priority::{Decision, Evaluation, RuleBook};
pub use rules::{Predicate, RuleInputs};
pub use series::SeriesStore;

use common::{Interval, PositionState, Result};

/// Series, indicators and rule books for one symbol.
///
/// The synchronizer drives this: closed intervals go through
/// `append_closed` + `refresh`, the forming interval through
/// `push_partial` / `update_partial`.
#[derive(Debug, Clone)]
pub struct FabStrategy {
    config: StrategyConfig,
    series: SeriesStore,
    engine: IndicatorEngine,
    closing: RuleBook,
    partial: RuleBook,
}

impl FabStrategy {
    pub fn new(config: StrategyConfig) -> Self {
        let engine = IndicatorEngine::new(&config);
        Self {
            config,
            series: SeriesStore::new(),
            engine,
            closing: RuleBook::closing(),
            partial: RuleBook::partial(),
        }
    }

    /// Replace the series with `intervals` and rebuild every indicator.
    pub fn load(&mut self, intervals: Vec<Interval>) {
        self.series.load(intervals);
        self.engine.recompute_all(&self.series);
    }

    /// Append a closed interval. Indicators are stale until `refresh`.
    pub fn append_closed(&mut self, interval: Interval) -> Result<()> {
        self.series.append(interval)
    }

    /// Drop the provisional interval before the closed one replaces it.
    pub fn discard_partial(&mut self) -> Option<Interval> {
        self.series.pop()
    }

    pub fn refresh(&mut self) {
        self.engine.recompute_all(&self.series);
    }

    /// Append the first provisional interval of a new period.
    pub fn push_partial(&mut self, interval: Interval) -> Result<()> {
        self.series.append(interval)?;
        if self.config.incremental {
            self.engine.append_incremental(&self.series);
        } else {
            self.engine.recompute_all(&self.series);
        }
        Ok(())
    }

    /// Overwrite the provisional interval with a newer reconstruction.
    pub fn update_partial(&mut self, interval: Interval) -> Result<()> {
        self.series.replace_last(interval)?;
        if self.config.incremental {
            self.engine.replace_last_incremental(&self.series);
        } else {
            self.engine.recompute_all(&self.series);
        }
        Ok(())
    }

    pub fn inputs(&self) -> RuleInputs<'_> {
        RuleInputs {
            timestamps: self.series.timestamps(),
            closes: self.series.closes(),
            highs: self.series.highs(),
            lows: self.series.lows(),
            ma: self.engine.indicators(),
            regime: self.engine.regime(),
            rule2: self.config.rule2,
        }
    }

    /// Walk the closing book at the newest index.
    pub fn evaluate_closing(&self, position: &PositionState) -> Evaluation {
        self.evaluate_with(&self.closing, position)
    }

    /// Walk the partial book at the newest (provisional) index.
    pub fn evaluate_partial(&self, position: &PositionState) -> Evaluation {
        self.evaluate_with(&self.partial, position)
    }

    fn evaluate_with(&self, book: &RuleBook, position: &PositionState) -> Evaluation {
        match self.series.last_index() {
            Some(i) => book.evaluate(&self.inputs(), i, position),
            None => Evaluation::default(),
        }
    }

    pub fn check_warm(&self) -> Result<()> {
        self.engine.check_warm()
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn series(&self) -> &SeriesStore {
        &self.series
    }

    pub fn indicators(&self) -> &IndicatorEngine {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowConfig;
    use crate::indicators::make_intervals;

    fn small() -> StrategyConfig {
        StrategyConfig {
            windows: WindowConfig {
                short: 2,
                mid: 3,
                long: 4,
                filter1: 4,
                filter2: 5,
                filter3: 3,
            },
            ..StrategyConfig::default()
        }
    }

    fn bits(s: &FabStrategy) -> Vec<u64> {
        MaKey::ALL
            .iter()
            .flat_map(|&k| s.indicators().column(k).iter().map(|v| v.to_bits()))
            .collect()
    }

    #[test]
    fn partial_updates_match_full_rebuild() {
        let intervals = make_intervals(&[5.0, 6.0, 7.0, 6.5, 6.0, 8.0, 9.5, 9.0]);
        let mut live = FabStrategy::new(small());
        live.load(intervals[..7].to_vec());

        let mut provisional = intervals[7];
        provisional.close = 8.7;
        live.push_partial(provisional).unwrap();
        live.update_partial(intervals[7]).unwrap();

        let mut batch = FabStrategy::new(small());
        batch.load(intervals);
        assert_eq!(bits(&live), bits(&batch));
    }

    #[test]
    fn closing_cycle_discards_provisional() {
        let intervals = make_intervals(&[5.0, 6.0, 7.0, 6.5, 6.0, 8.0]);
        let mut s = FabStrategy::new(small());
        s.load(intervals[..5].to_vec());
        s.push_partial(intervals[5]).unwrap();
        assert_eq!(s.series().len(), 6);

        assert!(s.discard_partial().is_some());
        s.append_closed(intervals[5]).unwrap();
        s.refresh();
        assert_eq!(s.series().len(), 6);
        assert_eq!(s.indicators().len(), 6);
    }

    #[test]
    fn empty_series_evaluates_to_nothing() {
        let s = FabStrategy::new(StrategyConfig::default());
        let eval = s.evaluate_closing(&PositionState::flat());
        assert!(eval.fired.is_empty());
        assert!(eval.decision.is_none());
        assert!(s.check_warm().is_err());
    }
}
