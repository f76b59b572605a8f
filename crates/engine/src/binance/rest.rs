use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, info, warn};

use common::{
    interval::{aggregate_intervals, merge_dedup, page_windows},
    Error, ExecutionLayer, ExecutionResult, Interval, MarketDataSource, OrderSide, PartialSample,
    PositionQuery, Result, RuleId, Side, Timeframe,
};

const BASE_URL: &str = "https://fapi.binance.com";

/// Most klines Binance returns per request.
pub const KLINE_PAGE_LIMIT: usize = 1000;

/// REST client for Binance USDⓈ-M futures. Market data needs no credentials;
/// orders and position queries are signed with HMAC-SHA256.
pub struct BinanceFuturesClient {
    api_key: Option<String>,
    secret: Option<String>,
    order_quantity: f64,
    http: Client,
}

impl BinanceFuturesClient {
    pub fn new(api_key: Option<String>, secret: Option<String>, order_quantity: f64) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key,
            secret,
            order_quantity,
            http,
        })
    }

    fn credentials(&self) -> Result<(&str, &str)> {
        match (&self.api_key, &self.secret) {
            (Some(key), Some(secret)) => Ok((key, secret)),
            _ => Err(Error::Config(
                "BINANCE_API_KEY and BINANCE_SECRET are required for signed requests".into(),
            )),
        }
    }

    async fn public_get(&self, path: &str, params: &str) -> Result<String> {
        let url = format!("{BASE_URL}{path}?{params}");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }

    async fn signed_get(&self, path: &str, params: &str) -> Result<String> {
        let (key, secret) = self.credentials()?;
        let query = signed_query(secret, params, Utc::now().timestamp_millis())?;
        let url = format!("{BASE_URL}{path}?{query}");

        let resp = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", key)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }

    async fn signed_post(&self, path: &str, params: &str) -> Result<String> {
        let (key, secret) = self.credentials()?;
        let body = signed_query(secret, params, Utc::now().timestamp_millis())?;
        let url = format!("{BASE_URL}{path}");

        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {text}")));
        }
        Ok(text)
    }

    /// One page of klines with open time in `[from, to)`.
    async fn klines(
        &self,
        symbol: &str,
        code: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Interval>> {
        let params = format!(
            "symbol={symbol}&interval={code}&startTime={}&endTime={}&limit={KLINE_PAGE_LIMIT}",
            from.timestamp_millis(),
            to.timestamp_millis() - 1,
        );
        let body = self.public_get("/fapi/v1/klines", &params).await?;
        parse_klines(&body)
    }

    /// All klines of width `step` with open time in `[from, to)`, paged
    /// around the provider limit and merged without duplicates.
    async fn paged_klines(
        &self,
        symbol: &str,
        code: &str,
        step: Duration,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Interval>> {
        let windows = page_windows(from, to, step, KLINE_PAGE_LIMIT);
        let mut pages = Vec::new();
        for (start, end) in &windows {
            pages.extend(self.klines(symbol, code, *start, *end).await?);
        }
        debug!(symbol, code, pages = windows.len(), candles = pages.len(), "Fetched klines");
        Ok(merge_dedup(pages))
    }

    /// Market order closing whatever position is open on `symbol`.
    async fn close_position(&self, symbol: &str, reason: &str) -> Result<ExecutionResult> {
        let quantity = self.current_position(symbol).await?;
        let Some(side) = Side::from_quantity(quantity) else {
            return Err(Error::Exchange(format!("No open {symbol} position to close")));
        };
        info!(symbol, side = %side, quantity, reason, "Closing position at market");
        self.market_order(symbol, side.closing_order(), quantity.abs(), true)
            .await
    }

    async fn market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        reduce_only: bool,
    ) -> Result<ExecutionResult> {
        let mut params = format!(
            "symbol={symbol}&side={side}&type=MARKET&quantity={quantity}&newOrderRespType=RESULT"
        );
        if reduce_only {
            params.push_str("&reduceOnly=true");
        }

        debug!(symbol, side = %side, quantity, "Submitting futures order");
        let body = self.signed_post("/fapi/v1/order", &params).await?;
        let resp: OrderResponse =
            serde_json::from_str(&body).map_err(|e| Error::Exchange(e.to_string()))?;

        let fill_price = resp.avg_price.parse::<f64>().unwrap_or(0.0);
        let filled = resp.executed_qty.parse::<f64>().unwrap_or(quantity);
        if fill_price == 0.0 {
            warn!(symbol, order_id = resp.order_id, "Order response carried no average price");
        }

        Ok(ExecutionResult {
            order_id: resp.order_id.to_string(),
            symbol: symbol.to_string(),
            side,
            fill_price,
            quantity: filled,
            timestamp: DateTime::<Utc>::from_timestamp_millis(resp.update_time)
                .unwrap_or_else(Utc::now),
        })
    }
}

/// `params&timestamp=..&signature=..` with an HMAC-SHA256 hex signature.
fn signed_query(secret: &str, params: &str, timestamp_ms: i64) -> Result<String> {
    let query = if params.is_empty() {
        format!("timestamp={timestamp_ms}")
    } else {
        format!("{params}&timestamp={timestamp_ms}")
    };
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Config(format!("Invalid API secret: {e}")))?;
    mac.update(query.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("{query}&signature={signature}"))
}

/// Kline rows are `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`.
fn parse_klines(body: &str) -> Result<Vec<Interval>> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)?;
    rows.iter().map(|row| parse_kline(row)).collect()
}

fn parse_kline(row: &[Value]) -> Result<Interval> {
    let field = |i: usize| -> Result<f64> {
        row.get(i)
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| Error::Exchange(format!("Malformed kline field {i}: {row:?}")))
    };
    let open_ms = row
        .first()
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::Exchange(format!("Malformed kline open time: {row:?}")))?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(open_ms)
        .ok_or_else(|| Error::Exchange(format!("Kline open time out of range: {open_ms}")))?;

    Ok(Interval {
        timestamp,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

#[async_trait]
impl MarketDataSource for BinanceFuturesClient {
    async fn fetch_closed_intervals(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Interval>> {
        let now = Utc::now();
        let closed_before = to.min(now);

        let mut intervals = match timeframe.binance_code() {
            Some(code) => {
                self.paged_klines(symbol, code, timeframe.duration(), from, to)
                    .await?
            }
            None => {
                // Not served natively: rebuild from 1-minute candles.
                let minutes = self
                    .paged_klines(symbol, "1m", Duration::minutes(1), from, closed_before)
                    .await?;
                aggregate_intervals(&minutes, timeframe, closed_before)
            }
        };

        intervals.retain(|c| c.timestamp >= from && c.timestamp + timeframe.duration() <= now);
        Ok(intervals)
    }

    async fn fetch_partial_sample(&self, symbol: &str) -> Result<PartialSample> {
        let body = self
            .public_get("/fapi/v1/klines", &format!("symbol={symbol}&interval=1m&limit=1"))
            .await?;
        let latest = parse_klines(&body)?
            .pop()
            .ok_or_else(|| Error::MissingSample(format!("Empty 1m kline response for {symbol}")))?;

        Ok(PartialSample {
            timestamp: latest.timestamp,
            open: latest.open,
            high: latest.high,
            low: latest.low,
            close: latest.close,
            volume: latest.volume,
        })
    }
}

#[async_trait]
impl ExecutionLayer for BinanceFuturesClient {
    async fn submit_enter(&self, symbol: &str, side: Side, rule: RuleId) -> Result<ExecutionResult> {
        info!(symbol, side = %side, rule = %rule, qty = self.order_quantity, "Entering at market");
        self.market_order(symbol, side.opening_order(), self.order_quantity, false)
            .await
    }

    async fn submit_exit(&self, symbol: &str, rule: RuleId) -> Result<ExecutionResult> {
        self.close_position(symbol, &format!("{rule} exit")).await
    }

    /// The stop condition has already triggered on the closed interval, so the
    /// position is closed at market rather than resting a stop order.
    async fn submit_stop(
        &self,
        symbol: &str,
        rule: RuleId,
        price_level: f64,
    ) -> Result<ExecutionResult> {
        self.close_position(symbol, &format!("{rule} stop at {price_level}"))
            .await
    }
}

#[async_trait]
impl PositionQuery for BinanceFuturesClient {
    async fn current_position(&self, symbol: &str) -> Result<f64> {
        let body = self
            .signed_get("/fapi/v2/positionRisk", &format!("symbol={symbol}"))
            .await?;
        let risks: Vec<PositionRisk> =
            serde_json::from_str(&body).map_err(|e| Error::Exchange(e.to_string()))?;
        signed_quantity(&risks, symbol)
    }
}

/// Net signed quantity across every position entry for `symbol`.
fn signed_quantity(risks: &[PositionRisk], symbol: &str) -> Result<f64> {
    risks
        .iter()
        .filter(|r| r.symbol == symbol)
        .map(|r| {
            r.position_amt
                .parse::<f64>()
                .map_err(|e| Error::Exchange(format!("Bad positionAmt '{}': {e}", r.position_amt)))
        })
        .sum()
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    #[serde(default)]
    avg_price: String,
    #[serde(default)]
    executed_qty: String,
    #[serde(default)]
    update_time: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    symbol: String,
    position_amt: String,
}
