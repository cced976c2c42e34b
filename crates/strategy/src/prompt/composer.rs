use std::fmt::Write;

use common::config::CompetitionStanding;
use common::models::{AccountSnapshot, MarketSnapshot};
use common::symbols::Precision;

use crate::risk::RiskConfig;

const CLOSING_INSTRUCTION: &str =
    "Based on the current market conditions and account status, provide your trading decision:";

/// Renders the decision prompt. Pure: same inputs, same bytes.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    risk: RiskConfig,
    standing: Option<CompetitionStanding>,
    starting_balance: f64,
}

impl PromptComposer {
    pub fn new(risk: RiskConfig) -> Self {
        Self {
            risk,
            standing: None,
            starting_balance: 0.0,
        }
    }

    /// Leaderboard values substituted into templates that reference them.
    pub fn with_standing(mut self, standing: CompetitionStanding, starting_balance: f64) -> Self {
        self.standing = Some(standing);
        self.starting_balance = starting_balance;
        self
    }

    pub fn risk(&self) -> &RiskConfig {
        &self.risk
    }

    pub fn compose(&self, market: &MarketSnapshot, account: &AccountSnapshot) -> String {
        format!(
            "{}\n\n{}\n{}\n\n{}",
            self.rules(account),
            render_market(market),
            render_account(account, self.risk.max_positions),
            CLOSING_INSTRUCTION
        )
    }

    fn rules(&self, account: &AccountSnapshot) -> String {
        let template = self.risk.prompt_template;
        let Some(standing) = &self.standing else {
            return template.to_string();
        };

        let your_pnl = if self.starting_balance > 0.0 {
            format!(
                "{:.2}",
                (account.equity() - self.starting_balance) / self.starting_balance * 100.0
            )
        } else {
            "n/a".to_string()
        };

        template
            .replace("{rank}", &standing.rank)
            .replace("{your_pnl}", &your_pnl)
            .replace("{leader_pnl}", &standing.leader_pnl)
            .replace("{time_left}", &standing.time_left)
    }
}

/// Market table for every symbol with data this cycle. Unavailable symbols
/// are left out entirely.
pub fn render_market(market: &MarketSnapshot) -> String {
    let mut out = String::from("CURRENT MARKET DATA:\n");
    let mut rendered = 0;

    for (symbol, quote) in market.available() {
        let decimals = price_decimals(symbol);
        let _ = write!(
            out,
            "\n{}:\n  Price: {}\n  RSI(14): {}\n  MACD: {} (Signal: {})\n  EMA20: {} | EMA50: {}\n  Trend: {}\n",
            symbol,
            fmt_usd(quote.price, decimals),
            fmt_opt(quote.rsi, 2),
            fmt_opt(quote.macd, 4),
            fmt_opt(quote.macd_signal, 4),
            fmt_usd(quote.ema_fast, decimals),
            fmt_usd(quote.ema_slow, decimals),
            quote.trend
        );
        rendered += 1;
    }

    if rendered == 0 {
        out.push_str("\n  No market data available.\n");
    }
    out
}

pub fn render_account(account: &AccountSnapshot, max_positions: usize) -> String {
    let mut out = format!(
        "\nACCOUNT STATUS:\n  Balance: {}\n  Unrealized PnL: {}\n  Equity: {}\n  Available: {}\n  Open Positions: {}/{}\n",
        fmt_usd(account.balance, 2),
        fmt_usd(account.unrealized_pnl, 2),
        fmt_usd(account.equity(), 2),
        fmt_usd(account.available, 2),
        account.position_count(),
        max_positions
    );

    if account.positions.is_empty() {
        out.push_str("\nCURRENT POSITIONS: None\n");
    } else {
        out.push_str("\nCURRENT POSITIONS:\n");
        for pos in &account.positions {
            let _ = writeln!(
                out,
                "  {}: {} {} @ {} (PnL: {}, {}x)",
                pos.symbol,
                pos.side,
                pos.size,
                fmt_usd(pos.entry_price, price_decimals(&pos.symbol)),
                fmt_usd(pos.unrealized_pnl, 2),
                pos.leverage
            );
        }
    }
    out
}

fn price_decimals(symbol: &str) -> usize {
    Precision::for_symbol(symbol).price.max(2) as usize
}

fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", decimals, v),
        None => "n/a".to_string(),
    }
}

/// `$1,234.56`, `-$12.50`.
pub fn fmt_usd(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(frac) => format!("{}${}.{}", sign, grouped, frac),
        None => format!("{}${}", sign, grouped),
    }
}
