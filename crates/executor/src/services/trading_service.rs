use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use common::actors::{Actor, ActorType, ControlMessage, ShutdownSignal, sleep_or_shutdown};
use common::models::{Intent, Position};
use exchange::AccountFeed;
use storage::RunState;
use strategy::breaker::BreakerState;
use strategy::gate::{RiskGate, Verdict};
use strategy::oracle::{DecisionOracle, OracleError};
use strategy::prompt::{PromptComposer, fmt_usd};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::services::backoff::Backoff;
use crate::services::execution_service::{ExecutionEngine, ExecutionOutcome};
use crate::services::snapshot_service::SnapshotService;

const ERROR_BACKOFF_BASE: Duration = Duration::from_secs(30);
const ERROR_BACKOFF_MAX: Duration = Duration::from_secs(600);
const NO_DATA_RETRY: Duration = Duration::from_secs(30);

/// Everything one trading cycle needs. Cheap to clone so the supervisor
/// can rebuild the actor after a crash.
#[derive(Clone)]
pub struct TradingContext {
    pub account: Arc<dyn AccountFeed>,
    pub snapshots: Arc<SnapshotService>,
    pub composer: Arc<PromptComposer>,
    pub oracle: Arc<DecisionOracle>,
    pub gate: Arc<RiskGate>,
    pub engine: Arc<ExecutionEngine>,
    pub state: Arc<RunState>,
    pub notification_tx: broadcast::Sender<String>,
    pub loop_interval: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed { executed: usize },
    Paused(Duration),
    NoMarketData,
}

pub struct TradingService {
    id: Uuid,
    ctx: TradingContext,
    shutdown: ShutdownSignal,
    backoff: Backoff,
}

#[async_trait]
impl Actor for TradingService {
    fn name(&self) -> ActorType {
        ActorType::TradingLoop
    }

    fn id(&self) -> Uuid {
        self.id
    }

    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
        let heartbeat_handle = self.spawn_heartbeat(supervisor_tx.clone());

        let risk = self.ctx.gate.risk();
        info!(
            "Starting trading loop: mode={} ({}), interval={}s",
            risk.mode,
            risk.description,
            self.ctx.loop_interval.as_secs()
        );
        self.notify(format!(
            "Trading loop started (mode: {}, {}, {} symbols)",
            risk.mode,
            risk.description,
            self.ctx.snapshots.universe().len()
        ));
        self.ctx
            .engine
            .configure_leverage(
                self.ctx.snapshots.universe(),
                self.ctx.gate.risk().default_leverage,
            )
            .await;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let wait = match self.run_cycle().await {
                Ok(CycleOutcome::Completed { .. }) => {
                    self.backoff.reset();
                    info!(
                        "Next decision in {} seconds...",
                        self.ctx.loop_interval.as_secs()
                    );
                    self.ctx.loop_interval
                }
                Ok(CycleOutcome::Paused(remaining)) => {
                    self.backoff.reset();
                    info!(
                        "Trading paused by daily-loss limit, sleeping {}s",
                        remaining.as_secs()
                    );
                    remaining
                }
                Ok(CycleOutcome::NoMarketData) => {
                    warn!("No market data available, retrying shortly");
                    NO_DATA_RETRY
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    error!(
                        "Trading cycle failed (attempt {}): {:#}. Retrying in {}s",
                        self.backoff.attempt(),
                        e,
                        delay.as_secs()
                    );
                    delay
                }
            };

            if sleep_or_shutdown(wait, &mut self.shutdown).await {
                break;
            }
        }

        info!("Trading loop stopped");
        self.notify("Trading loop stopped".to_string());
        heartbeat_handle.abort();
        let _ = supervisor_tx
            .send(ControlMessage::Shutdown(self.name(), self.id))
            .await;
        Ok(())
    }
}

impl TradingService {
    pub fn new(ctx: TradingContext, shutdown: ShutdownSignal) -> Self {
        Self {
            id: Uuid::new_v4(),
            ctx,
            shutdown,
            backoff: Backoff::new(ERROR_BACKOFF_BASE, ERROR_BACKOFF_MAX),
        }
    }

    /// One pass: account, breaker, market, prompt, model, gate, execution.
    /// Transient I/O failures surface as `Err` and abort the cycle.
    pub async fn run_cycle(&self) -> anyhow::Result<CycleOutcome> {
        let mut account = self
            .ctx
            .account
            .account_snapshot()
            .await
            .context("fetching account snapshot")?;

        let now = Instant::now();
        match self.ctx.state.check_breaker(account.equity(), now).await {
            BreakerState::Active => {}
            BreakerState::Tripped { drawdown } => {
                self.notify(format!(
                    "PAUSED - daily loss limit reached: {:.2}%",
                    drawdown * 100.0
                ));
                let remaining = self
                    .ctx
                    .state
                    .paused_for(now)
                    .await
                    .unwrap_or(self.ctx.loop_interval);
                return Ok(CycleOutcome::Paused(remaining));
            }
            BreakerState::Paused { remaining } => return Ok(CycleOutcome::Paused(remaining)),
        }

        info!("Fetching market data...");
        let market = self.ctx.snapshots.market_snapshot().await;
        if market.available_count() == 0 {
            return Ok(CycleOutcome::NoMarketData);
        }

        info!("Querying decision model...");
        let prompt = self.ctx.composer.compose(&market, &account);
        let decisions = match self.ctx.oracle.decide(&prompt).await {
            Ok(decisions) => decisions,
            Err(OracleError::Malformed { reason, .. }) => {
                warn!("No valid decision this cycle: {}", reason);
                Vec::new()
            }
            Err(e) => return Err(e).context("querying decision model"),
        };

        let mut executed = 0;
        for (i, raw) in decisions.iter().enumerate() {
            if *self.shutdown.borrow() {
                warn!(
                    "Shutdown requested, dropping {} remaining decision(s)",
                    decisions.len() - i
                );
                break;
            }

            let Verdict::Accept(intent) = self.ctx.gate.evaluate(raw, &account, &market) else {
                continue;
            };
            let outcome = self.ctx.engine.execute(&intent).await;

            // Later decisions in the batch must see this one's effect. An
            // unknown outcome counts as applied.
            let applied = matches!(
                outcome,
                ExecutionOutcome::Done | ExecutionOutcome::Unknown(_)
            );
            match (&intent, applied) {
                (Intent::Enter(entry), true) => {
                    account.apply_entry(
                        Position {
                            symbol: entry.symbol.clone(),
                            side: entry.side,
                            size: entry.quantity,
                            entry_price: entry.reference_price,
                            unrealized_pnl: 0.0,
                            leverage: entry.leverage,
                        },
                        entry.margin(),
                    );
                    executed += 1;
                }
                (Intent::Close(close), true) => {
                    account.apply_close(&close.symbol);
                    executed += 1;
                }
                _ => {}
            }
        }

        info!(
            "Balance: {} | PnL: {}",
            fmt_usd(account.balance, 2),
            fmt_usd(account.unrealized_pnl, 2)
        );
        Ok(CycleOutcome::Completed { executed })
    }

    fn notify(&self, msg: String) {
        let _ = self.ctx.notification_tx.send(msg);
    }
}
