use chrono::{DateTime, Utc};

use common::{Interval, PartialSample};

/// Folds 1-minute samples into the interval that is still forming.
///
/// high = max, low = min, volume = sum, close = newest sample, open = first
/// sample's open. A sample for the same minute as the previous one replaces
/// it rather than being counted twice.
#[derive(Debug, Clone, Default)]
pub struct PartialIntervalAccumulator {
    highs: Vec<f64>,
    lows: Vec<f64>,
    volumes: Vec<f64>,
    open_price: Option<f64>,
    open_timestamp: Option<DateTime<Utc>>,
    close: f64,
    sample_count: usize,
    last_sample_at: Option<DateTime<Utc>>,
}

impl PartialIntervalAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold(&mut self, sample: PartialSample) {
        if self.last_sample_at == Some(sample.timestamp) {
            self.highs.pop();
            self.lows.pop();
            self.volumes.pop();
            self.sample_count -= 1;
        }
        if self.open_price.is_none() {
            self.open_price = Some(sample.open);
            self.open_timestamp = Some(sample.timestamp);
        }

        self.highs.push(sample.high);
        self.lows.push(sample.low);
        self.volumes.push(sample.volume);
        self.close = sample.close;
        self.sample_count += 1;
        self.last_sample_at = Some(sample.timestamp);
    }

    /// Provisional interval opening at `interval_open`, or `None` before the
    /// first sample.
    pub fn synthesize(&self, interval_open: DateTime<Utc>) -> Option<Interval> {
        let open = self.open_price?;
        Some(Interval {
            timestamp: interval_open,
            open,
            high: self.highs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            low: self.lows.iter().copied().fold(f64::INFINITY, f64::min),
            close: self.close,
            volume: self.volumes.iter().sum(),
        })
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    /// Time of the first folded sample.
    pub fn open_timestamp(&self) -> Option<DateTime<Utc>> {
        self.open_timestamp
    }
}
