use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    Error, ExecutionLayer, ExecutionResult, OrderSide, PositionQuery, Result, RuleId, Side,
};

/// Simulated execution for paper trading.
///
/// Fills are simulated at the latest known price with configurable slippage.
/// No real orders are ever sent to Binance.
pub struct PaperClient {
    /// Signed position per symbol: positive long, negative short.
    positions: Arc<RwLock<HashMap<String, f64>>>,
    /// Latest known price per symbol, updated via `update_price`.
    prices: Arc<RwLock<HashMap<String, f64>>>,
    /// Quantity opened by every enter.
    order_quantity: f64,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
}

impl PaperClient {
    pub fn new(order_quantity: f64, slippage_bps: f64) -> Self {
        info!(
            order_quantity = order_quantity,
            slippage_bps = slippage_bps,
            "PaperClient initialized"
        );
        Self {
            positions: Arc::new(RwLock::new(HashMap::new())),
            prices: Arc::new(RwLock::new(HashMap::new())),
            order_quantity,
            slippage_bps,
        }
    }

    /// Update the latest price for a symbol (fed from synchronizer price events).
    pub async fn update_price(&self, symbol: &str, price: f64) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    async fn fill(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        position_after: f64,
    ) -> Result<ExecutionResult> {
        let mid_price = self.prices.read().await.get(symbol).copied().ok_or_else(|| {
            Error::Exchange(format!(
                "PaperClient has no price for '{symbol}'. Ensure price updates are flowing."
            ))
        })?;

        // Apply slippage: buys pay more, sells receive less
        let fill_price = match side {
            OrderSide::Buy => mid_price * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => mid_price * (1.0 - self.slippage_bps / 10_000.0),
        };

        self.positions
            .write()
            .await
            .insert(symbol.to_string(), position_after);

        debug!(
            symbol,
            side = %side,
            mid = mid_price,
            fill = fill_price,
            qty = quantity,
            position = position_after,
            "Paper fill simulated"
        );

        Ok(ExecutionResult {
            order_id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            fill_price,
            quantity,
            timestamp: Utc::now(),
        })
    }

    async fn close(&self, symbol: &str) -> Result<ExecutionResult> {
        let quantity = self.current_position(symbol).await?;
        let side = Side::from_quantity(quantity)
            .ok_or_else(|| Error::Exchange(format!("No open paper position on {symbol}")))?;
        self.fill(symbol, side.closing_order(), quantity.abs(), 0.0)
            .await
    }
}

#[async_trait]
impl ExecutionLayer for PaperClient {
    async fn submit_enter(&self, symbol: &str, side: Side, rule: RuleId) -> Result<ExecutionResult> {
        let current = self.current_position(symbol).await?;
        let signed = match side {
            Side::Long => self.order_quantity,
            Side::Short => -self.order_quantity,
        };
        debug!(symbol, side = %side, rule = %rule, "Paper enter");
        self.fill(symbol, side.opening_order(), self.order_quantity, current + signed)
            .await
    }

    async fn submit_exit(&self, symbol: &str, rule: RuleId) -> Result<ExecutionResult> {
        debug!(symbol, rule = %rule, "Paper exit");
        self.close(symbol).await
    }

    async fn submit_stop(
        &self,
        symbol: &str,
        rule: RuleId,
        price_level: f64,
    ) -> Result<ExecutionResult> {
        debug!(symbol, rule = %rule, price_level, "Paper stop");
        self.close(symbol).await
    }
}

#[async_trait]
impl PositionQuery for PaperClient {
    async fn current_position(&self, symbol: &str) -> Result<f64> {
        Ok(self
            .positions
            .read()
            .await
            .get(symbol)
            .copied()
            .unwrap_or(0.0))
    }
}
