//! Moving averages and regime bands derived from the series.

pub mod engine;
pub mod regime;
pub mod sma;

pub use engine::IndicatorEngine;
pub use regime::RegimeParams;
pub use sma::RollingMean;

/// Logical name of a configured moving average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MaKey {
    /// Fast MA (default 7).
    Short,
    /// Mid MA (default 77).
    Mid,
    /// Slow MA the crossovers are measured against (default 231).
    Long,
    /// Regime filter (default 200).
    Filter1,
    /// Regime filter (default 279).
    Filter2,
    /// Reference filter (default 100). Charted only.
    Filter3,
}

impl MaKey {
    pub const ALL: [MaKey; 6] = [
        MaKey::Short,
        MaKey::Mid,
        MaKey::Long,
        MaKey::Filter1,
        MaKey::Filter2,
        MaKey::Filter3,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for MaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MaKey::Short => "short",
            MaKey::Mid => "mid",
            MaKey::Long => "long",
            MaKey::Filter1 => "filter1",
            MaKey::Filter2 => "filter2",
            MaKey::Filter3 => "filter3",
        };
        write!(f, "{s}")
    }
}

/// Borrowed view of every moving-average column, keyed by `MaKey`.
///
/// Rules receive this explicitly instead of reading engine state.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorSet<'a> {
    columns: [&'a [f64]; 6],
}

impl<'a> IndicatorSet<'a> {
    /// Columns in `MaKey::ALL` order.
    pub fn from_columns(columns: [&'a [f64]; 6]) -> Self {
        Self { columns }
    }

    pub fn column(&self, key: MaKey) -> &'a [f64] {
        self.columns[key.slot()]
    }

    /// Value at `i`, NaN when out of range or not yet defined.
    pub fn at(&self, key: MaKey, i: usize) -> f64 {
        self.column(key).get(i).copied().unwrap_or(f64::NAN)
    }

    pub fn short(&self, i: usize) -> f64 {
        self.at(MaKey::Short, i)
    }

    pub fn mid(&self, i: usize) -> f64 {
        self.at(MaKey::Mid, i)
    }

    pub fn long(&self, i: usize) -> f64 {
        self.at(MaKey::Long, i)
    }

    pub fn filter1(&self, i: usize) -> f64 {
        self.at(MaKey::Filter1, i)
    }

    pub fn filter2(&self, i: usize) -> f64 {
        self.at(MaKey::Filter2, i)
    }
}

/// Create intervals from close prices for tests.
///
/// high = close + 1, low = close - 1, open = previous close, volume = 1.
#[cfg(test)]
pub fn make_intervals(closes: &[f64]) -> Vec<common::Interval> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| common::Interval {
            timestamp: base + chrono::Duration::minutes(i as i64),
            open: if i == 0 { close } else { closes[i - 1] },
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1.0,
        })
        .collect()
}
