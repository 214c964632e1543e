use std::sync::Arc;

use tracing::{error, info};

use common::{OrderErrorKind, OrderExecution, OrderOutcome, OrderSide, Position, TradingMode};

/// Sends entry and exit orders through the execution port.
///
/// This is the ONLY component that calls `OrderExecution::place_market_order`.
/// Entries reach it only after the risk gate and sizing have passed.
#[derive(Clone)]
pub struct OrderExecutor {
    client: Arc<dyn OrderExecution>,
    mode: TradingMode,
}

impl OrderExecutor {
    pub fn new(client: Arc<dyn OrderExecution>, mode: TradingMode) -> Self {
        Self { client, mode }
    }

    pub fn mode(&self) -> TradingMode {
        self.mode
    }

    pub async fn open(&self, symbol: &str, side: OrderSide, quantity: f64) -> OrderOutcome {
        info!(%symbol, %side, quantity, mode = %self.mode, "Placing entry order");
        self.submit(symbol, side, quantity).await
    }

    /// Market order on the opposite side for the full position quantity.
    pub async fn close(&self, position: &Position) -> OrderOutcome {
        let side = position.side().opposite();
        info!(symbol = %position.symbol(), %side, quantity = position.quantity(), "Placing exit order");
        self.submit(position.symbol(), side, position.quantity()).await
    }

    async fn submit(&self, symbol: &str, side: OrderSide, quantity: f64) -> OrderOutcome {
        if !(quantity.is_finite() && quantity > 0.0) {
            return OrderOutcome::Failed {
                kind: OrderErrorKind::InvalidOrder,
                message: format!("invalid quantity {quantity}"),
            };
        }
        match self.client.place_market_order(symbol, side, quantity).await {
            OrderOutcome::Filled(fill) if fill.filled_amount > 0.0 && fill.average_price > 0.0 => {
                info!(
                    %symbol,
                    order_id = %fill.order_id,
                    price = fill.average_price,
                    qty = fill.filled_amount,
                    "Order filled"
                );
                OrderOutcome::Filled(fill)
            }
            OrderOutcome::Filled(fill) => {
                error!(%symbol, order_id = %fill.order_id, "Order reported an empty fill");
                OrderOutcome::Failed {
                    kind: OrderErrorKind::Unknown,
                    message: format!("order {} filled nothing", fill.order_id),
                }
            }
            OrderOutcome::Failed { kind, message } => {
                error!(%symbol, %kind, error = %message, "Order submission failed");
                OrderOutcome::Failed { kind, message }
            }
        }
    }
}
