use std::sync::Arc;

use chrono::Utc;
use common::models::{
    CloseIntent, EntryIntent, Intent, LedgerAction, LedgerEntry, OrderAck, OrderRequest,
};
use common::symbols::SymbolUniverse;
use exchange::{ExchangeError, OrderGateway};
use storage::RunState;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// What happened to one accepted intent.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Exchange confirmed the action; ledger and notification written.
    Done,
    /// Nothing to send (hold).
    NoOp,
    /// The exchange refused, or the request never reached it.
    Failed(String),
    /// Submission timed out; the order may or may not exist.
    Unknown(String),
}

/// Turns intents into exchange orders. One submission per order, no retries.
pub struct ExecutionEngine {
    gateway: Arc<dyn OrderGateway>,
    state: Arc<RunState>,
    notification_tx: broadcast::Sender<String>,
}

impl ExecutionEngine {
    pub fn new(
        gateway: Arc<dyn OrderGateway>,
        state: Arc<RunState>,
        notification_tx: broadcast::Sender<String>,
    ) -> Self {
        Self {
            gateway,
            state,
            notification_tx,
        }
    }

    /// Sets the default leverage on every symbol. Failures are only logged.
    pub async fn configure_leverage(&self, universe: &SymbolUniverse, leverage: u32) {
        for symbol in universe.symbols() {
            match self.gateway.set_leverage(symbol, leverage).await {
                Ok(()) => info!("Leverage {}x configured for {}", leverage, symbol),
                Err(e) => warn!("Could not configure leverage for {}: {}", symbol, e),
            }
        }
    }

    pub async fn execute(&self, intent: &Intent) -> ExecutionOutcome {
        match intent {
            Intent::Hold { .. } => ExecutionOutcome::NoOp,
            Intent::Enter(entry) => self.enter(entry).await,
            Intent::Close(close) => self.close(close).await,
        }
    }

    async fn enter(&self, intent: &EntryIntent) -> ExecutionOutcome {
        if let Err(e) = self
            .gateway
            .set_leverage(&intent.symbol, intent.leverage)
            .await
        {
            return self.failed(&intent.symbol, "set leverage", e);
        }

        let ack = match self.gateway.place_order(&OrderRequest::entry(intent)).await {
            Ok(ack) => ack,
            Err(e) => return self.failed(&intent.symbol, "entry order", e),
        };
        let (price, quantity) = fill(&ack, intent.reference_price, intent.quantity);
        let action = LedgerAction::Open(intent.side);
        info!(
            "{} executed: {} x{} qty={} @ {} (order {} {})",
            action, intent.symbol, intent.leverage, quantity, price, ack.order_id, ack.status
        );

        if let Some(legs) = OrderRequest::bracket(intent) {
            for leg in &legs {
                if let Err(e) = self.gateway.place_order(leg).await {
                    // The position is open regardless; only the protective leg is missing.
                    error!("{} leg for {} failed: {}", leg.kind.as_str(), intent.symbol, e);
                    self.notify(format!(
                        "WARNING: {} for {} was not placed: {}",
                        leg.kind.as_str(),
                        intent.symbol,
                        e
                    ));
                }
            }
        } else {
            warn!("{} opened without a take-profit/stop-loss bracket", intent.symbol);
        }

        self.state
            .record_trade(LedgerEntry {
                action,
                symbol: intent.symbol.clone(),
                justification: intent.justification.clone(),
                price,
                quantity,
                timestamp: Utc::now(),
            })
            .await;

        let fmt_level = |level: Option<f64>| match level {
            Some(p) => intent.precision.format_price(p),
            None => "-".to_string(),
        };
        self.notify(format!(
            "{}\n{} @ {}\nSize: {}\nLeverage: {}x\nTP: {}\nSL: {}\nConfidence: {:.0}%\n{}",
            action,
            intent.symbol,
            intent.precision.format_price(price),
            intent.precision.format_quantity(quantity),
            intent.leverage,
            fmt_level(intent.profit_target),
            fmt_level(intent.stop_loss),
            intent.confidence * 100.0,
            intent.justification
        ));
        ExecutionOutcome::Done
    }

    async fn close(&self, intent: &CloseIntent) -> ExecutionOutcome {
        let ack = match self.gateway.place_order(&OrderRequest::close(intent)).await {
            Ok(ack) => ack,
            Err(e) => return self.failed(&intent.symbol, "close order", e),
        };
        let (price, quantity) = fill(&ack, 0.0, intent.quantity);
        info!(
            "Position closed: {} {} qty={} (order {} {})",
            intent.position_side, intent.symbol, quantity, ack.order_id, ack.status
        );

        self.state
            .record_trade(LedgerEntry {
                action: LedgerAction::Close,
                symbol: intent.symbol.clone(),
                justification: intent.justification.clone(),
                price,
                quantity,
                timestamp: Utc::now(),
            })
            .await;

        self.notify(format!(
            "CLOSE {}\nReason: {}",
            intent.symbol, intent.justification
        ));
        ExecutionOutcome::Done
    }

    fn failed(&self, symbol: &str, step: &str, e: ExchangeError) -> ExecutionOutcome {
        if e.is_outcome_unknown() {
            error!(
                "{} for {}: outcome UNKNOWN (check the exchange): {}",
                step, symbol, e
            );
            self.notify(format!(
                "ERROR: {} for {} got no readable answer, order state unknown",
                step, symbol
            ));
            ExecutionOutcome::Unknown(e.to_string())
        } else {
            error!("{} for {} rejected: {}", step, symbol, e);
            self.notify(format!("ERROR executing {} for {}: {}", step, symbol, e));
            ExecutionOutcome::Failed(e.to_string())
        }
    }

    fn notify(&self, msg: String) {
        let _ = self.notification_tx.send(msg);
    }
}

/// Average fill price and executed size, falling back to the request.
fn fill(ack: &OrderAck, reference_price: f64, requested_qty: f64) -> (f64, f64) {
    let price = ack.avg_price.unwrap_or(reference_price);
    let quantity = if ack.executed_qty > 0.0 {
        ack.executed_qty
    } else {
        requested_qty
    };
    (price, quantity)
}
