use std::sync::Arc;

use tracing::{error, info, warn};

use common::{Action, ExecutionLayer, ExecutionResult, PositionQuery, PositionState, Result};

/// Outcome of corroborating the internal position against the exchange.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Corroboration {
    Agrees,
    Mismatch { external_quantity: f64 },
}

/// Hands the synchronizer's decisions to the execution layer.
///
/// This is the ONLY component that calls `ExecutionLayer`. It never retries:
/// a failed submission is returned to the caller unchanged.
#[derive(Clone)]
pub struct ActionExecutor {
    execution: Arc<dyn ExecutionLayer>,
    positions: Arc<dyn PositionQuery>,
}

impl ActionExecutor {
    pub fn new(execution: Arc<dyn ExecutionLayer>, positions: Arc<dyn PositionQuery>) -> Self {
        Self {
            execution,
            positions,
        }
    }

    pub async fn external_position(&self, symbol: &str) -> Result<f64> {
        self.positions.current_position(symbol).await
    }

    /// Compare `internal` with the exchange's signed quantity for `symbol`.
    pub async fn corroborate(&self, symbol: &str, internal: &PositionState) -> Result<Corroboration> {
        let quantity = self.external_position(symbol).await?;
        if internal.agrees_with(quantity) {
            Ok(Corroboration::Agrees)
        } else {
            warn!(
                symbol,
                internal = %internal,
                external_quantity = quantity,
                "Internal position disagrees with exchange"
            );
            Ok(Corroboration::Mismatch {
                external_quantity: quantity,
            })
        }
    }

    pub async fn dispatch(&self, symbol: &str, action: &Action) -> Result<ExecutionResult> {
        info!(symbol, action = %action, "Dispatching action");

        let outcome = match *action {
            Action::Enter { side, rule } => self.execution.submit_enter(symbol, side, rule).await,
            Action::Exit { rule, .. } => self.execution.submit_exit(symbol, rule).await,
            Action::Stop {
                rule, price_level, ..
            } => self.execution.submit_stop(symbol, rule, price_level).await,
        };

        match &outcome {
            Ok(result) => info!(
                symbol,
                order_id = %result.order_id,
                side = %result.side,
                price = result.fill_price,
                qty = result.quantity,
                "Action filled"
            ),
            Err(e) => error!(symbol, action = %action, error = %e, "Action submission failed"),
        }
        outcome
    }
}
