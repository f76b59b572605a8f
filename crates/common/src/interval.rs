//! Helpers for fetching and shaping candle sequences.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::{Interval, Timeframe};

/// Split `[from, to)` into consecutive windows holding at most `page_limit`
/// steps of `step` each. The last window may be shorter.
pub fn page_windows(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    step: Duration,
    page_limit: usize,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut windows = Vec::new();
    if from >= to || page_limit == 0 || step <= Duration::zero() {
        return windows;
    }

    let span = step * page_limit as i32;
    let mut start = from;
    while start < to {
        let end = (start + span).min(to);
        windows.push((start, end));
        start = end;
    }
    windows
}

/// Merge pages into one ordered sequence. On duplicate timestamps the
/// interval that appears later in the input wins.
pub fn merge_dedup<I>(pages: I) -> Vec<Interval>
where
    I: IntoIterator<Item = Interval>,
{
    let mut by_ts: BTreeMap<DateTime<Utc>, Interval> = BTreeMap::new();
    for interval in pages {
        by_ts.insert(interval.timestamp, interval);
    }
    by_ts.into_values().collect()
}

/// Open time of the `timeframe` bucket containing `ts`, aligned to the Unix epoch.
pub fn bucket_start(ts: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    let bucket_secs = i64::from(timeframe.minutes()) * 60;
    let secs = ts.timestamp();
    DateTime::<Utc>::from_timestamp(secs - secs.rem_euclid(bucket_secs), 0).unwrap_or(ts)
}

/// Aggregate finer candles into `timeframe` buckets aligned to the Unix epoch.
///
/// open = first open, close = last close, high = max, low = min, volume = sum.
/// Buckets that do not end at or before `closed_before` are dropped, so a
/// partially covered trailing bucket never leaks into the closed series.
pub fn aggregate_intervals(
    source: &[Interval],
    timeframe: Timeframe,
    closed_before: DateTime<Utc>,
) -> Vec<Interval> {
    let mut out: Vec<Interval> = Vec::new();

    for candle in merge_dedup(source.iter().copied()) {
        let bucket_ts = bucket_start(candle.timestamp, timeframe);
        match out.last_mut() {
            Some(current) if current.timestamp == bucket_ts => {
                current.high = current.high.max(candle.high);
                current.low = current.low.min(candle.low);
                current.close = candle.close;
                current.volume += candle.volume;
            }
            _ => out.push(Interval {
                timestamp: bucket_ts,
                ..candle
            }),
        }
    }

    out.retain(|c| c.timestamp + timeframe.duration() <= closed_before);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn candle(minute: i64, close: f64) -> Interval {
        Interval {
            timestamp: at(minute),
            open: close - 1.0,
            high: close + 2.0,
            low: close - 2.0,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn page_windows_respect_limit() {
        let windows = page_windows(at(0), at(2500), Duration::minutes(1), 1000);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0], (at(0), at(1000)));
        assert_eq!(windows[1], (at(1000), at(2000)));
        assert_eq!(windows[2], (at(2000), at(2500)));
    }

    #[test]
    fn page_windows_empty_range() {
        assert!(page_windows(at(5), at(5), Duration::minutes(1), 1000).is_empty());
        assert!(page_windows(at(6), at(5), Duration::minutes(1), 1000).is_empty());
    }

    #[test]
    fn merge_dedup_keeps_later_duplicate() {
        let first = vec![candle(0, 10.0), candle(1, 11.0)];
        let second = vec![candle(1, 99.0), candle(2, 12.0)];
        let merged = merge_dedup(first.into_iter().chain(second));

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[1].close, 99.0);
        assert!(merged.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn aggregate_builds_buckets_and_drops_open_tail() {
        let minutes: Vec<Interval> = (0..8).map(|m| candle(m, 100.0 + m as f64)).collect();
        let tf = Timeframe::from_minutes(3);
        // Bucket [6, 9) is not closed at minute 8.
        let out = aggregate_intervals(&minutes, tf, at(8));

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].timestamp, at(0));
        assert_eq!(out[0].open, 99.0);
        assert_eq!(out[0].close, 102.0);
        assert_eq!(out[0].high, 104.0);
        assert_eq!(out[0].low, 98.0);
        assert_eq!(out[0].volume, 3.0);
        assert_eq!(out[1].timestamp, at(3));
    }

    #[test]
    fn bucket_start_aligns_to_epoch() {
        let tf = Timeframe::from_minutes(77);
        let ts = at(0) + Duration::seconds(4321);
        let start = bucket_start(ts, tf);
        assert!(start <= ts);
        assert!(ts < start + tf.duration());
        assert_eq!(start.timestamp() % (77 * 60), 0);
        assert_eq!(bucket_start(start, tf), start);
    }
}
