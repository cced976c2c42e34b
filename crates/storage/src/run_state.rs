use std::sync::Arc;
use std::time::{Duration, Instant};

use common::models::LedgerEntry;
use strategy::breaker::{self, BreakerState, DailyLossBreaker};
use tokio::sync::Mutex;

use crate::ledger::TradeLedger;

/// Process-lifetime state shared by the trading loop and the operator
/// console. Nothing here is persisted.
pub struct RunState {
    starting_balance: f64,
    breaker: Mutex<DailyLossBreaker>,
    ledger: Arc<TradeLedger>,
}

impl RunState {
    pub fn new(starting_balance: f64, breaker: DailyLossBreaker) -> Arc<Self> {
        Self::with_ledger(starting_balance, breaker, Arc::new(TradeLedger::new()))
    }

    pub fn with_ledger(
        starting_balance: f64,
        breaker: DailyLossBreaker,
        ledger: Arc<TradeLedger>,
    ) -> Arc<Self> {
        Arc::new(Self {
            starting_balance,
            breaker: Mutex::new(breaker),
            ledger,
        })
    }

    pub fn starting_balance(&self) -> f64 {
        self.starting_balance
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    /// Runs the daily-loss check against the current equity.
    pub async fn check_breaker(&self, equity: f64, now: Instant) -> BreakerState {
        self.breaker
            .lock()
            .await
            .evaluate(self.starting_balance, equity, now)
    }

    /// Remaining pause, if any. Does not re-evaluate.
    pub async fn paused_for(&self, now: Instant) -> Option<Duration> {
        self.breaker.lock().await.paused_for(now)
    }

    pub async fn record_trade(&self, entry: LedgerEntry) {
        self.ledger.append(entry).await;
    }

    /// Equity change relative to the starting balance, as a fraction.
    pub fn drift(&self, equity: f64) -> Option<f64> {
        breaker::drawdown(self.starting_balance, equity)
    }
}
