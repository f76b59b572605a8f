use chrono::{DateTime, Utc};
use tracing::debug;

use common::{interval::merge_dedup, Error, Interval, Result};

/// Ordered candles for one symbol/timeframe, stored column-wise so the
/// indicator engine and rules can index them directly.
#[derive(Debug, Clone, Default)]
pub struct SeriesStore {
    timestamps: Vec<DateTime<Utc>>,
    opens: Vec<f64>,
    highs: Vec<f64>,
    lows: Vec<f64>,
    closes: Vec<f64>,
    volumes: Vec<f64>,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_intervals(intervals: Vec<Interval>) -> Self {
        let mut store = Self::new();
        store.load(intervals);
        store
    }

    /// Replace the contents. Input order does not matter; on duplicate
    /// timestamps the interval loaded last wins.
    pub fn load(&mut self, intervals: Vec<Interval>) {
        let received = intervals.len();
        let merged = merge_dedup(intervals);
        if merged.len() != received {
            debug!(
                received,
                kept = merged.len(),
                "Dropped duplicate intervals on load"
            );
        }

        *self = Self::default();
        for interval in merged {
            self.push(interval);
        }
    }

    /// Append one interval. Its timestamp must be strictly after the tail.
    pub fn append(&mut self, interval: Interval) -> Result<()> {
        if let Some(tail) = self.timestamps.last().copied() {
            if interval.timestamp <= tail {
                return Err(Error::OutOfOrder {
                    timestamp: interval.timestamp,
                    tail,
                });
            }
        }
        self.push(interval);
        Ok(())
    }

    /// Overwrite the final interval, typically the still-forming one.
    pub fn replace_last(&mut self, interval: Interval) -> Result<()> {
        let n = self.len();
        if n == 0 {
            return Err(Error::Other("replace_last on an empty series".into()));
        }
        if n >= 2 && interval.timestamp <= self.timestamps[n - 2] {
            return Err(Error::OutOfOrder {
                timestamp: interval.timestamp,
                tail: self.timestamps[n - 2],
            });
        }

        let i = n - 1;
        self.timestamps[i] = interval.timestamp;
        self.opens[i] = interval.open;
        self.highs[i] = interval.high;
        self.lows[i] = interval.low;
        self.closes[i] = interval.close;
        self.volumes[i] = interval.volume;
        Ok(())
    }

    /// Drop the final interval, returning it.
    pub fn pop(&mut self) -> Option<Interval> {
        let last = self.last()?;
        self.timestamps.pop();
        self.opens.pop();
        self.highs.pop();
        self.lows.pop();
        self.closes.pop();
        self.volumes.pop();
        Some(last)
    }

    fn push(&mut self, interval: Interval) {
        self.timestamps.push(interval.timestamp);
        self.opens.push(interval.open);
        self.highs.push(interval.high);
        self.lows.push(interval.low);
        self.closes.push(interval.close);
        self.volumes.push(interval.volume);
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<Interval> {
        if i >= self.len() {
            return None;
        }
        Some(Interval {
            timestamp: self.timestamps[i],
            open: self.opens[i],
            high: self.highs[i],
            low: self.lows[i],
            close: self.closes[i],
            volume: self.volumes[i],
        })
    }

    pub fn last(&self) -> Option<Interval> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Interval `k` positions from the end: `from_end(1)` is the newest.
    pub fn from_end(&self, k: usize) -> Option<Interval> {
        self.len().checked_sub(k).and_then(|i| self.get(i))
    }

    /// Index of the newest interval.
    pub fn last_index(&self) -> Option<usize> {
        self.len().checked_sub(1)
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn highs(&self) -> &[f64] {
        &self.highs
    }

    pub fn lows(&self) -> &[f64] {
        &self.lows
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn volumes(&self) -> &[f64] {
        &self.volumes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn bar(minute: i64, close: f64) -> Interval {
        Interval {
            timestamp: at(minute),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn load_sorts_and_dedups_later_wins() {
        let store = SeriesStore::from_intervals(vec![bar(10, 3.0), bar(0, 1.0), bar(10, 4.0)]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.closes(), &[1.0, 4.0]);
    }

    #[test]
    fn append_rejects_non_increasing_timestamp() {
        let mut store = SeriesStore::from_intervals(vec![bar(0, 1.0), bar(5, 2.0)]);
        let err = store.append(bar(5, 3.0)).unwrap_err();
        assert!(matches!(err, Error::OutOfOrder { .. }));
        assert!(store.append(bar(3, 3.0)).is_err());
        assert_eq!(store.len(), 2);

        store.append(bar(10, 3.0)).unwrap();
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn replace_last_overwrites_tail_only() {
        let mut store = SeriesStore::from_intervals(vec![bar(0, 1.0), bar(5, 2.0)]);
        store.replace_last(bar(5, 9.0)).unwrap();
        assert_eq!(store.closes(), &[1.0, 9.0]);
        assert!(store.replace_last(bar(0, 9.0)).is_err());
    }

    #[test]
    fn replace_last_on_empty_fails() {
        let mut store = SeriesStore::new();
        assert!(store.replace_last(bar(0, 1.0)).is_err());
    }

    #[test]
    fn from_end_and_pop() {
        let mut store = SeriesStore::from_intervals(vec![bar(0, 1.0), bar(5, 2.0), bar(10, 3.0)]);
        assert_eq!(store.from_end(1).unwrap().close, 3.0);
        assert_eq!(store.from_end(3).unwrap().close, 1.0);
        assert!(store.from_end(4).is_none());
        assert_eq!(store.pop().unwrap().close, 3.0);
        assert_eq!(store.last_index(), Some(1));
    }
}
