use std::sync::{Arc, Mutex};

use anyhow::Context;
use dotenvy::dotenv;
use teloxide::Bot;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info};

use common::actors::ActorType;
use common::config::{AppConfig, StartingBalance, TradingMode};
use common::logger;
use exchange::{AccountFeed, BinanceClient};
use storage::RunState;
use strategy::breaker::DailyLossBreaker;
use strategy::gate::RiskGate;
use strategy::llm::OpenRouterClient;
use strategy::oracle::DecisionOracle;
use strategy::prompt::PromptComposer;
use strategy::risk::RiskConfig;

use crate::actors::supervisor::Supervisor;
use crate::services::execution_service::ExecutionEngine;
use crate::services::operator_desk::OperatorDesk;
use crate::services::snapshot_service::SnapshotService;
use crate::services::telegram_service::{TelegramConsole, TelegramNotifier};
use crate::services::trading_service::{TradingContext, TradingService};

mod actors;
mod services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = AppConfig::from_env().context("loading configuration")?;
    let _log_guard = logger::setup_logger(config.log_dir.as_deref());
    debug!("System starting up with {:?}", config);

    let binance = Arc::new(BinanceClient::new(&config.exchange)?);
    let llm = Arc::new(OpenRouterClient::new(&config.llm)?);

    let starting_balance = match config.starting_balance {
        StartingBalance::Fixed(balance) => balance,
        StartingBalance::LiveEquity => binance
            .account_snapshot()
            .await
            .context("reading live equity for the starting balance")?
            .equity(),
    };
    info!(
        "Mode: {} | Symbols: {} | Starting balance: {:.2} | Loss limit: {:.1}%",
        config.mode,
        config.universe.symbols().join(", "),
        starting_balance,
        config.daily_loss_limit * 100.0
    );

    let state = RunState::new(
        starting_balance,
        DailyLossBreaker::new(config.daily_loss_limit, config.pause_cooldown),
    );
    let risk = RiskConfig::for_mode(config.mode);

    let mut composer = PromptComposer::new(risk.clone());
    if config.mode == TradingMode::Competitive {
        composer = composer.with_standing(config.standing.clone(), starting_balance);
    }

    let (notify_tx, notify_rx) = broadcast::channel::<String>(256);
    let snapshots = Arc::new(SnapshotService::new(binance.clone(), config.universe.clone()));

    let ctx = TradingContext {
        account: binance.clone(),
        snapshots: snapshots.clone(),
        composer: Arc::new(composer),
        oracle: Arc::new(DecisionOracle::new(llm.clone(), config.llm.decision_model.clone())),
        gate: Arc::new(RiskGate::new(risk.clone(), config.universe.clone())),
        engine: Arc::new(ExecutionEngine::new(
            binance.clone(),
            state.clone(),
            notify_tx.clone(),
        )),
        state: state.clone(),
        notification_tx: notify_tx.clone(),
        loop_interval: config.loop_interval,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut supervisor = Supervisor::new();

    let shutdown_for_trading = shutdown_rx.clone();
    supervisor.register_actor(
        ActorType::TradingLoop,
        Box::new(move || {
            Box::new(TradingService::new(
                ctx.clone(),
                shutdown_for_trading.clone(),
            ))
        }),
    );

    match &config.telegram {
        Some(telegram) => {
            let bot = Bot::new(&telegram.bot_token);
            let chat_id = telegram.chat_id;

            // The first notifier takes the receiver opened before any actor
            // starts, so the startup notification is not missed.
            let first_rx = Mutex::new(Some(notify_rx));
            let bot_for_notifier = bot.clone();
            let tx_for_notifier = notify_tx.clone();
            let shutdown_for_notifier = shutdown_rx.clone();
            supervisor.register_actor(
                ActorType::Notifier,
                Box::new(move || {
                    let rx = first_rx
                        .lock()
                        .ok()
                        .and_then(|mut rx| rx.take())
                        .unwrap_or_else(|| tx_for_notifier.subscribe());
                    Box::new(TelegramNotifier::new(
                        bot_for_notifier.clone(),
                        chat_id,
                        rx,
                        shutdown_for_notifier.clone(),
                    ))
                }),
            );

            let desk = Arc::new(OperatorDesk::new(
                state.clone(),
                binance.clone(),
                snapshots.clone(),
                llm.clone(),
                config.llm.chat_model.clone(),
                risk.max_positions,
            ));
            let shutdown_for_console = shutdown_rx.clone();
            supervisor.register_actor(
                ActorType::OperatorConsole,
                Box::new(move || {
                    Box::new(TelegramConsole::new(
                        bot.clone(),
                        chat_id,
                        desk.clone(),
                        shutdown_for_console.clone(),
                    ))
                }),
            );
        }
        None => info!("Telegram not configured, notifications and operator console disabled"),
    }

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // Dropping the sender would read as a shutdown request.
            error!("Could not listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested, finishing current work...");
        let _ = shutdown_tx.send(true);
    });

    supervisor.start(shutdown_rx).await;
    info!("Bot stopped");
    Ok(())
}
