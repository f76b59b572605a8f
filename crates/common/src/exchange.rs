use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{ExecutionResult, Interval, PartialSample, Result, RuleId, Side, Timeframe};

/// Source of candle data.
///
/// `BinanceFuturesClient` implements this against the exchange; tests use
/// in-memory fakes.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Closed intervals whose open time lies in `[from, to)`, oldest first.
    ///
    /// Implementations must page around provider limits and merge the pages
    /// without duplicate timestamps. The still-forming interval is never returned.
    async fn fetch_closed_intervals(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Interval>>;

    /// Latest 1-minute sample of the interval that is still forming.
    async fn fetch_partial_sample(&self, symbol: &str) -> Result<PartialSample>;
}

/// Order placement. Sizing and exchange order types live behind this trait.
///
/// Only the synchronizer's `ActionExecutor` calls it. Failures are returned
/// as-is; retry policy belongs to the implementation.
#[async_trait]
pub trait ExecutionLayer: Send + Sync {
    async fn submit_enter(&self, symbol: &str, side: Side, rule: RuleId)
        -> Result<ExecutionResult>;

    async fn submit_exit(&self, symbol: &str, rule: RuleId) -> Result<ExecutionResult>;

    async fn submit_stop(
        &self,
        symbol: &str,
        rule: RuleId,
        price_level: f64,
    ) -> Result<ExecutionResult>;
}

/// External position ledger, used to corroborate the synchronizer's own state.
#[async_trait]
pub trait PositionQuery: Send + Sync {
    /// Signed position quantity: positive long, negative short, zero flat.
    async fn current_position(&self, symbol: &str) -> Result<f64>;
}
