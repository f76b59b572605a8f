use chrono::{DateTime, Utc};
use tracing::info;

use common::{interval::bucket_start, Error, Interval, MarketDataSource, Result, Timeframe};

/// Fetch the `count` most recent closed intervals as of `now`.
///
/// The interval containing `now` is still forming and is excluded.
pub async fn backfill(
    market: &dyn MarketDataSource,
    symbol: &str,
    timeframe: Timeframe,
    count: usize,
    now: DateTime<Utc>,
) -> Result<Vec<Interval>> {
    let forming = bucket_start(now, timeframe);
    let from = forming - timeframe.duration() * count as i32;

    let intervals = market
        .fetch_closed_intervals(symbol, timeframe, from, forming)
        .await?;
    if intervals.is_empty() {
        return Err(Error::MissingSample(format!(
            "no closed {timeframe} intervals for {symbol} between {from} and {forming}"
        )));
    }

    info!(
        symbol,
        timeframe = %timeframe,
        requested = count,
        received = intervals.len(),
        "Backfilled closed intervals"
    );
    Ok(intervals)
}
