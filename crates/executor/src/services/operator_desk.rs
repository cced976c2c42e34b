use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;

use exchange::AccountFeed;
use storage::RunState;
use strategy::llm::{ChatMessage, ChatRequest, LlmClient};
use strategy::prompt::{fmt_usd, render_account, render_market};
use tracing::{debug, warn};

use crate::services::snapshot_service::SnapshotService;

pub const DEFAULT_HISTORY: usize = 10;

const CHAT_TEMPERATURE: f32 = 0.7;
const CHAT_MAX_TOKENS: u32 = 500;

const ASSISTANT_PROMPT: &str = "You are the assistant of an automated crypto perpetual-futures \
trading bot. Answer the operator's question briefly and concretely, using only the account and \
market data below. Do not invent numbers. If the data does not answer the question, say so.";

/// Read-only operator commands. Every reply is built from fresh snapshots;
/// nothing here mutates trading state.
pub struct OperatorDesk {
    state: Arc<RunState>,
    account: Arc<dyn AccountFeed>,
    snapshots: Arc<SnapshotService>,
    llm: Arc<dyn LlmClient>,
    chat_model: String,
    max_positions: usize,
}

impl OperatorDesk {
    pub fn new(
        state: Arc<RunState>,
        account: Arc<dyn AccountFeed>,
        snapshots: Arc<SnapshotService>,
        llm: Arc<dyn LlmClient>,
        chat_model: impl Into<String>,
        max_positions: usize,
    ) -> Self {
        Self {
            state,
            account,
            snapshots,
            llm,
            chat_model: chat_model.into(),
            max_positions,
        }
    }

    /// Routes one operator message to a reply.
    pub async fn handle(&self, text: &str) -> String {
        let text = text.trim();
        let mut parts = text.split_whitespace();
        let command = parts
            .next()
            .map(|c| c.split('@').next().unwrap_or(c).to_lowercase())
            .unwrap_or_default();

        debug!("Operator command: {:?}", command);
        match command.as_str() {
            "/status" => self.status().await,
            "/history" => {
                let n = parts
                    .next()
                    .and_then(|n| n.parse::<usize>().ok())
                    .unwrap_or(DEFAULT_HISTORY);
                self.history(n).await
            }
            "/market" => self.market().await,
            "/help" | "/start" => self.help(),
            _ if text.starts_with('/') => {
                format!("Unknown command {}\n\n{}", command, self.help())
            }
            _ if text.is_empty() => self.help(),
            _ => self.ask(text).await,
        }
    }

    pub async fn status(&self) -> String {
        let account = match self.account.account_snapshot().await {
            Ok(account) => account,
            Err(e) => {
                warn!("Status: account fetch failed: {}", e);
                return format!("Could not fetch account: {}", e);
            }
        };

        let mut out = format!(
            "STATUS\nBalance: {}\nPnL: {}\nEquity: {}\nAvailable: {}\n",
            fmt_usd(account.balance, 2),
            fmt_usd(account.unrealized_pnl, 2),
            fmt_usd(account.equity(), 2),
            fmt_usd(account.available, 2)
        );
        if let Some(drift) = self.state.drift(account.equity()) {
            let _ = writeln!(
                out,
                "Since start: {:+.2}% (from {})",
                drift * 100.0,
                fmt_usd(self.state.starting_balance(), 2)
            );
        }
        match self.state.paused_for(Instant::now()).await {
            Some(remaining) => {
                let _ = writeln!(
                    out,
                    "Trading: PAUSED (daily loss limit, {} min left)",
                    remaining.as_secs().div_ceil(60)
                );
            }
            None => out.push_str("Trading: active\n"),
        }

        let _ = writeln!(
            out,
            "\nPositions: {}/{}",
            account.position_count(),
            self.max_positions
        );
        for pos in &account.positions {
            let _ = writeln!(
                out,
                "{} {} {} @ {} | PnL {} | {}x",
                pos.symbol,
                pos.side,
                pos.size,
                pos.entry_price,
                fmt_usd(pos.unrealized_pnl, 2),
                pos.leverage
            );
        }
        out
    }

    /// The last `n` ledger entries, oldest first. `n` is capped at what the
    /// ledger retains.
    pub async fn history(&self, n: usize) -> String {
        let ledger = self.state.ledger();
        let entries = ledger.recent(n.clamp(1, ledger.capacity())).await;
        if entries.is_empty() {
            return "No trades yet.".to_string();
        }

        let mut out = format!("LAST {} TRADES\n", entries.len());
        for entry in &entries {
            let _ = writeln!(
                out,
                "\n{} {} {}\nqty {} @ {}\n{}",
                entry.timestamp.format("%m-%d %H:%M"),
                entry.action,
                entry.symbol,
                entry.quantity,
                entry.price,
                entry.justification
            );
        }
        out
    }

    pub async fn market(&self) -> String {
        let snapshot = self.snapshots.market_snapshot().await;
        render_market(&snapshot)
    }

    /// Free-form question answered by the chat model with live context.
    pub async fn ask(&self, question: &str) -> String {
        let (account, market) = tokio::join!(
            self.account.account_snapshot(),
            self.snapshots.market_snapshot()
        );
        let account_context = match account {
            Ok(account) => render_account(&account, self.max_positions),
            Err(e) => format!("\nACCOUNT STATUS: unavailable ({})\n", e),
        };
        let context = format!("{}\n{}", render_market(&market), account_context);

        let request = ChatRequest::new(
            self.chat_model.clone(),
            vec![
                ChatMessage::system(format!("{}\n\n{}", ASSISTANT_PROMPT, context)),
                ChatMessage::user(question),
            ],
        )
        .with_temperature(CHAT_TEMPERATURE)
        .with_max_tokens(CHAT_MAX_TOKENS);

        match self.llm.complete(request).await {
            Ok(answer) => answer.trim().to_string(),
            Err(e) => {
                warn!("Operator question failed: {}", e);
                format!("Could not answer right now: {}", e)
            }
        }
    }

    pub fn help(&self) -> String {
        format!(
            "Commands:\n\
             /status - balance, PnL and open positions\n\
             /history [n] - last n trades (default {}, max {})\n\
             /market - current market snapshot\n\
             /help - this message\n\
             Anything else is answered by the assistant.",
            DEFAULT_HISTORY,
            self.state.ledger().capacity()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{FakeAccount, FakeMarket, ScriptedLlm};
    use chrono::Utc;
    use common::models::{AccountSnapshot, LedgerAction, LedgerEntry, Position, Side};
    use common::symbols::SymbolUniverse;
    use std::time::Duration;
    use strategy::breaker::DailyLossBreaker;
    use strategy::llm::{LlmError, MessageRole};

    fn account(balance: f64) -> AccountSnapshot {
        AccountSnapshot {
            balance,
            unrealized_pnl: 25.0,
            available: balance * 0.8,
            positions: vec![Position {
                symbol: "ETHUSDT".into(),
                side: Side::Short,
                size: 0.5,
                entry_price: 3_100.0,
                unrealized_pnl: 25.0,
                leverage: 10,
            }],
        }
    }

    struct Fixture {
        desk: OperatorDesk,
        state: Arc<RunState>,
        account: Arc<FakeAccount>,
        llm: Arc<ScriptedLlm>,
    }

    fn fixture(balance: f64, replies: Vec<Result<String, LlmError>>) -> Fixture {
        let state = RunState::new(
            10_000.0,
            DailyLossBreaker::new(0.05, Duration::from_secs(3600)),
        );
        let account = Arc::new(FakeAccount::new(account(balance)));
        let llm = Arc::new(ScriptedLlm::replying(replies));
        let snapshots = Arc::new(SnapshotService::new(
            Arc::new(FakeMarket::trending(&[("BTCUSDT", 50_000.0)])),
            SymbolUniverse::parse("BTC"),
        ));
        let desk = OperatorDesk::new(
            state.clone(),
            account.clone(),
            snapshots,
            llm.clone(),
            "chat-model",
            6,
        );
        Fixture {
            desk,
            state,
            account,
            llm,
        }
    }

    fn trade(i: usize) -> LedgerEntry {
        LedgerEntry {
            action: LedgerAction::Open(Side::Long),
            symbol: format!("T{}USDT", i),
            justification: format!("reason {}", i),
            price: 100.0,
            quantity: 1.0,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn status_reports_balances_drift_and_positions() {
        let f = fixture(10_475.0, vec![]);

        let reply = f.desk.handle("/status").await;

        assert!(reply.contains("Balance: $10,475.00"));
        assert!(reply.contains("Equity: $10,500.00"));
        assert!(reply.contains("Since start: +5.00%"));
        assert!(reply.contains("Trading: active"));
        assert!(reply.contains("Positions: 1/6"));
        assert!(reply.contains("ETHUSDT SHORT 0.5 @ 3100"));
    }

    #[tokio::test]
    async fn status_shows_breaker_pause() {
        let f = fixture(9_000.0, vec![]);
        f.state.check_breaker(9_000.0, Instant::now()).await;

        let reply = f.desk.status().await;
        assert!(reply.contains("Trading: PAUSED"));
        assert!(reply.contains("60 min left"));
    }

    #[tokio::test]
    async fn status_survives_account_failure() {
        let f = fixture(10_000.0, vec![]);
        f.account.set_failing(true);

        let reply = f.desk.handle("/status").await;
        assert!(reply.starts_with("Could not fetch account"));
    }

    #[tokio::test]
    async fn history_defaults_and_caps() {
        let f = fixture(10_000.0, vec![]);
        assert_eq!(f.desk.handle("/history").await, "No trades yet.");

        for i in 0..60 {
            f.state.record_trade(trade(i)).await;
        }

        let reply = f.desk.handle("/history").await;
        assert!(reply.starts_with("LAST 10 TRADES"));
        assert!(reply.contains("T59USDT"));
        assert!(!reply.contains("T49USDT"));

        let reply = f.desk.handle("/history 3").await;
        assert!(reply.starts_with("LAST 3 TRADES"));
        assert!(reply.find("T57USDT") < reply.find("T59USDT"));

        let reply = f.desk.handle("/history 500").await;
        assert!(reply.starts_with("LAST 50 TRADES"));
    }

    #[tokio::test]
    async fn market_renders_snapshot() {
        let f = fixture(10_000.0, vec![]);
        let reply = f.desk.handle("/market@arena_bot").await;
        assert!(reply.contains("BTCUSDT"));
        assert!(reply.contains("$50,000.00"));
    }

    #[tokio::test]
    async fn free_text_goes_to_chat_model_with_context() {
        let f = fixture(10_000.0, vec![Ok("  ETH short is up $25.  ".into())]);

        let reply = f.desk.handle("how is the eth trade doing?").await;

        assert_eq!(reply, "ETH short is up $25.");
        let requests = f.llm.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.model, "chat-model");
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(500));
        assert_eq!(request.messages[0].role, MessageRole::System);
        assert!(request.messages[0].content.contains("ETHUSDT"));
        assert!(request.messages[0].content.contains("BTCUSDT"));
        assert_eq!(request.messages[1].content, "how is the eth trade doing?");
    }

    #[tokio::test]
    async fn chat_failure_is_reported_not_raised() {
        let f = fixture(10_000.0, vec![Err(LlmError::Timeout(60))]);
        let reply = f.desk.ask("anything?").await;
        assert!(reply.starts_with("Could not answer right now"));
    }

    #[tokio::test]
    async fn unknown_command_lists_help() {
        let f = fixture(10_000.0, vec![]);
        let reply = f.desk.handle("/yolo").await;
        assert!(reply.starts_with("Unknown command /yolo"));
        assert!(reply.contains("/history [n] - last n trades (default 10, max 50)"));
        assert!(f.llm.requests().is_empty());
    }
}
