use std::fmt;

use common::models::{
    AccountSnapshot, CloseIntent, EntryIntent, Intent, MarketSnapshot, RawDecision, Side, Signal,
};
use common::symbols::{Precision, SymbolUniverse};
use thiserror::Error;
use tracing::{info, warn};

use crate::risk::RiskConfig;

const NO_JUSTIFICATION: &str = "no justification given";

/// Outcome of validating one raw decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept(Intent),
    Skip { symbol: String, reason: SkipReason },
    Reject { reason: Rejection },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    LowConfidence { confidence: f64, floor: f64 },
    NoOpenPosition,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowConfidence { confidence, floor } => {
                write!(f, "confidence {:.2} below floor {:.2}", confidence, floor)
            }
            Self::NoOpenPosition => f.write_str("no open position to close"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("decision names no coin")]
    MissingSymbol,

    #[error("{0} is not in the trading universe")]
    UnknownSymbol(String),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("position cap reached ({open}/{max})")]
    PositionCapReached { open: usize, max: usize },

    #[error("a position is already open on {0}")]
    PositionAlreadyOpen(String),

    #[error("no market data for {0} this cycle")]
    MarketUnavailable(String),

    #[error("required margin {required:.2} exceeds usable margin {usable:.2}")]
    CashBufferViolation { required: f64, usable: f64 },

    #[error("quantity for {0} rounds down to zero")]
    ZeroQuantity(String),

    #[error("{side} bracket on the wrong side of {price}: target {target:?}, stop {stop:?}")]
    InvertedBracket {
        side: Side,
        price: f64,
        target: Option<f64>,
        stop: Option<f64>,
    },
}

/// Turns untrusted model output into risk-bounded intents. Every numeric
/// limit comes from `RiskConfig`; nothing in the prompt text is trusted.
#[derive(Debug, Clone)]
pub struct RiskGate {
    risk: RiskConfig,
    universe: SymbolUniverse,
}

impl RiskGate {
    pub fn new(risk: RiskConfig, universe: SymbolUniverse) -> Self {
        Self { risk, universe }
    }

    pub fn risk(&self) -> &RiskConfig {
        &self.risk
    }

    pub fn evaluate(
        &self,
        raw: &RawDecision,
        account: &AccountSnapshot,
        market: &MarketSnapshot,
    ) -> Verdict {
        let verdict = self.classify(raw, account, market);
        match &verdict {
            Verdict::Accept(Intent::Hold { justification }) => info!("HOLD: {}", justification),
            Verdict::Accept(Intent::Enter(e)) => info!(
                "Accepted {} {} qty={} lev={}x conf={:.2}",
                e.side, e.symbol, e.quantity, e.leverage, e.confidence
            ),
            Verdict::Accept(Intent::Close(c)) => {
                info!("Accepted CLOSE {} {} qty={}", c.position_side, c.symbol, c.quantity)
            }
            Verdict::Skip { symbol, reason } => warn!("Skipping {}: {}", symbol, reason),
            Verdict::Reject { reason } => warn!("Rejected decision: {}", reason),
        }
        verdict
    }

    fn classify(
        &self,
        raw: &RawDecision,
        account: &AccountSnapshot,
        market: &MarketSnapshot,
    ) -> Verdict {
        let justification = raw.justification_or(NO_JUSTIFICATION).to_string();

        let side = match raw.signal() {
            Signal::Hold => return Verdict::Accept(Intent::Hold { justification }),
            Signal::Unknown(other) => {
                warn!("Unrecognized signal {:?}, treating as HOLD", other);
                return Verdict::Accept(Intent::Hold { justification });
            }
            Signal::Enter(side) => Some(side),
            Signal::Close => None,
        };

        let symbol = match self.resolve_symbol(raw) {
            Ok(symbol) => symbol,
            Err(reason) => return Verdict::Reject { reason },
        };

        match side {
            Some(side) => self.enter(raw, side, symbol, justification, account, market),
            None => close(symbol, justification, account),
        }
    }

    fn resolve_symbol(&self, raw: &RawDecision) -> Result<String, Rejection> {
        let coin = raw
            .coin
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(Rejection::MissingSymbol)?;
        self.universe
            .resolve(coin)
            .ok_or_else(|| Rejection::UnknownSymbol(coin.to_uppercase()))
    }

    fn enter(
        &self,
        raw: &RawDecision,
        side: Side,
        symbol: String,
        justification: String,
        account: &AccountSnapshot,
        market: &MarketSnapshot,
    ) -> Verdict {
        let confidence = match raw.confidence {
            Some(c) if c.is_finite() && (0.0..=1.0).contains(&c) => c,
            Some(c) => return reject(invalid("confidence", format!("{} is outside [0, 1]", c))),
            None => return reject(invalid("confidence", "missing".to_string())),
        };
        if confidence < self.risk.min_confidence {
            return Verdict::Skip {
                symbol,
                reason: SkipReason::LowConfidence {
                    confidence,
                    floor: self.risk.min_confidence,
                },
            };
        }

        if account.position_count() >= self.risk.max_positions {
            return reject(Rejection::PositionCapReached {
                open: account.position_count(),
                max: self.risk.max_positions,
            });
        }
        if account.position(&symbol).is_some() {
            return reject(Rejection::PositionAlreadyOpen(symbol));
        }

        let Some(quote) = market.quote(&symbol) else {
            return reject(Rejection::MarketUnavailable(symbol));
        };
        let price = quote.price;
        let leverage = self.risk.clamp_leverage(raw.leverage);
        let usable = self.risk.usable_margin(account.available);

        let quantity = match self.size(raw, usable, leverage, price) {
            Ok(quantity) => quantity,
            Err(reason) => return reject(reason),
        };

        let required = quantity * price / leverage as f64;
        if required > usable * (1.0 + 1e-9) {
            return reject(Rejection::CashBufferViolation { required, usable });
        }

        let precision = Precision::for_symbol(&symbol);
        let quantity = precision.floor_quantity(quantity);
        if quantity <= 0.0 {
            return reject(Rejection::ZeroQuantity(symbol));
        }

        let price_level = |level: Option<f64>| {
            level
                .filter(|p| p.is_finite() && *p > 0.0)
                .map(|p| precision.round_price(p))
        };
        let profit_target = price_level(raw.profit_target);
        let stop_loss = price_level(raw.stop_loss);

        let inverted = match side {
            Side::Long => {
                profit_target.is_some_and(|tp| tp <= price) || stop_loss.is_some_and(|sl| sl >= price)
            }
            Side::Short => {
                profit_target.is_some_and(|tp| tp >= price) || stop_loss.is_some_and(|sl| sl <= price)
            }
        };
        if inverted {
            return reject(Rejection::InvertedBracket {
                side,
                price,
                target: profit_target,
                stop: stop_loss,
            });
        }

        Verdict::Accept(Intent::Enter(EntryIntent {
            symbol,
            side,
            confidence,
            leverage,
            quantity,
            reference_price: price,
            profit_target,
            stop_loss,
            invalidation: raw
                .invalidation_condition
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            justification,
            precision,
        }))
    }

    /// Unrounded contract quantity: explicit size, else a margin budget
    /// (`risk_usd`, then a share of usable margin) levered at `price`.
    fn size(
        &self,
        raw: &RawDecision,
        usable: f64,
        leverage: u32,
        price: f64,
    ) -> Result<f64, Rejection> {
        if let Some(quantity) = raw.quantity.filter(|q| q.is_finite() && *q > 0.0) {
            return Ok(quantity);
        }

        let margin = match raw.risk_usd.filter(|r| r.is_finite() && *r > 0.0) {
            Some(risk_usd) => risk_usd,
            None => {
                let percent = match raw.size_percent {
                    Some(p) if p.is_finite() && p > 0.0 && p <= 100.0 => p,
                    Some(p) => return Err(invalid("size_percent", format!("{} is outside (0, 100]", p))),
                    None => self.risk.default_size_percent,
                };
                usable * percent / 100.0
            }
        };

        Ok(margin * leverage as f64 / price)
    }
}

fn close(symbol: String, justification: String, account: &AccountSnapshot) -> Verdict {
    match account.position(&symbol) {
        Some(position) => Verdict::Accept(Intent::Close(CloseIntent {
            precision: Precision::for_symbol(&symbol),
            symbol,
            position_side: position.side,
            quantity: position.size,
            justification,
        })),
        None => Verdict::Skip {
            symbol,
            reason: SkipReason::NoOpenPosition,
        },
    }
}

fn reject(reason: Rejection) -> Verdict {
    Verdict::Reject { reason }
}

fn invalid(field: &'static str, reason: String) -> Rejection {
    Rejection::InvalidField { field, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::TradingMode;
    use common::models::{MarketQuote, OrderRequest, Position, SymbolMarket, Trend};

    fn quote(price: f64) -> SymbolMarket {
        SymbolMarket::Available(MarketQuote {
            price,
            rsi: Some(55.0),
            macd: Some(1.0),
            macd_signal: Some(0.5),
            ema_fast: price,
            ema_slow: price * 0.99,
            volume: 1_000.0,
            trend: Trend::Bullish,
        })
    }

    fn market() -> MarketSnapshot {
        MarketSnapshot::new(vec![
            ("BTCUSDT".into(), quote(50_000.0)),
            ("ETHUSDT".into(), quote(3_000.0)),
            ("SOLUSDT".into(), quote(150.0)),
            ("XRPUSDT".into(), quote(0.5)),
            ("DOGEUSDT".into(), quote(0.1)),
            ("BNBUSDT".into(), quote(600.0)),
        ])
    }

    fn account(available: f64, positions: Vec<Position>) -> AccountSnapshot {
        AccountSnapshot {
            balance: available,
            unrealized_pnl: 0.0,
            available,
            positions,
        }
    }

    fn position(symbol: &str, side: Side, size: f64) -> Position {
        Position {
            symbol: symbol.into(),
            side,
            size,
            entry_price: 100.0,
            unrealized_pnl: 0.0,
            leverage: 10,
        }
    }

    fn gate(mode: TradingMode) -> RiskGate {
        RiskGate::new(RiskConfig::for_mode(mode), SymbolUniverse::default())
    }

    fn decision(json: &str) -> RawDecision {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn entry_at_position_cap_is_rejected() {
        let universe = SymbolUniverse::parse("BTC ETH SOL XRP DOGE BNB ADA");
        let gate = RiskGate::new(RiskConfig::for_mode(TradingMode::Baseline), universe);
        let open = ["BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT", "DOGEUSDT", "BNBUSDT"]
            .iter()
            .map(|s| position(s, Side::Long, 1.0))
            .collect();

        let verdict = gate.evaluate(
            &decision(r#"{"signal":"buy_to_enter","coin":"ADA","confidence":0.9}"#),
            &account(10_000.0, open),
            &market(),
        );
        assert_eq!(
            verdict,
            Verdict::Reject {
                reason: Rejection::PositionCapReached { open: 6, max: 6 }
            }
        );
    }

    #[test]
    fn low_confidence_entry_is_skipped() {
        let mut risk = RiskConfig::for_mode(TradingMode::Baseline);
        risk.min_confidence = 0.70;
        let gate = RiskGate::new(risk, SymbolUniverse::default());

        let verdict = gate.evaluate(
            &decision(r#"{"signal":"sell_to_enter","coin":"BTC","confidence":0.5,"quantity":0.01,"leverage":10}"#),
            &account(10_000.0, vec![]),
            &market(),
        );
        assert!(matches!(
            verdict,
            Verdict::Skip {
                reason: SkipReason::LowConfidence { .. },
                ..
            }
        ));
    }

    #[test]
    fn close_without_position_is_skipped() {
        let verdict = gate(TradingMode::Baseline).evaluate(
            &decision(r#"{"signal":"close","coin":"ETH"}"#),
            &account(10_000.0, vec![position("BTCUSDT", Side::Long, 0.1)]),
            &market(),
        );
        assert_eq!(
            verdict,
            Verdict::Skip {
                symbol: "ETHUSDT".into(),
                reason: SkipReason::NoOpenPosition
            }
        );
    }

    #[test]
    fn close_is_sized_to_the_open_position() {
        let verdict = gate(TradingMode::Baseline).evaluate(
            &decision(r#"{"signal":"close","coin":"ethusdt","justification":"target hit"}"#),
            &account(10_000.0, vec![position("ETHUSDT", Side::Short, 0.75)]),
            &market(),
        );
        let Verdict::Accept(Intent::Close(close)) = verdict else {
            panic!("expected close, got {:?}", verdict);
        };
        assert_eq!(close.quantity, 0.75);
        assert_eq!(close.position_side, Side::Short);
        assert_eq!(close.justification, "target hit");
    }

    #[test]
    fn hold_is_accepted_whatever_else_is_present() {
        let gate = gate(TradingMode::Aggressive);
        for json in [
            r#"{"signal":"hold","justification":"chop"}"#,
            r#"{"signal":"HOLD","coin":"NOPE","quantity":-5,"leverage":500,"confidence":7}"#,
            r#"{"action":"wait"}"#,
            r#"{"signal":"adjust_stop","coin":"BTC"}"#,
            r#"{}"#,
        ] {
            let verdict = gate.evaluate(&decision(json), &account(1_000.0, vec![]), &market());
            assert!(
                matches!(verdict, Verdict::Accept(Intent::Hold { .. })),
                "{} gave {:?}",
                json,
                verdict
            );
        }
    }

    #[test]
    fn fallback_sizing_respects_cash_buffer() {
        let gate = gate(TradingMode::Baseline);
        let account = account(1_000.0, vec![]);
        let usable = gate.risk().usable_margin(account.available);

        for json in [
            r#"{"signal":"buy_to_enter","coin":"SOL","confidence":0.9,"leverage":10}"#,
            r#"{"signal":"buy_to_enter","coin":"SOL","confidence":0.9,"leverage":50,"size_percent":100}"#,
            r#"{"signal":"sell_to_enter","coin":"BNB","confidence":0.9,"risk_usd":300}"#,
        ] {
            let Verdict::Accept(Intent::Enter(intent)) =
                gate.evaluate(&decision(json), &account, &market())
            else {
                panic!("{} was not accepted", json);
            };
            assert!(intent.margin() <= usable + 1e-9, "{}: {}", json, intent.margin());
        }
    }

    #[test]
    fn oversized_quantity_breaches_cash_buffer() {
        let verdict = gate(TradingMode::Baseline).evaluate(
            &decision(r#"{"signal":"buy_to_enter","coin":"BTC","confidence":0.9,"quantity":1.0,"leverage":10}"#),
            &account(1_000.0, vec![]),
            &market(),
        );
        assert!(matches!(
            verdict,
            Verdict::Reject {
                reason: Rejection::CashBufferViolation { .. }
            }
        ));
    }

    #[test]
    fn leverage_is_clamped_and_quantity_floored() {
        let verdict = gate(TradingMode::Conservative).evaluate(
            &decision(
                r#"{"signal":"buy_to_enter","coin":"SOL","confidence":0.85,"leverage":25,
                    "risk_usd":50,"profit_target":160.004,"stop_loss":145.0,
                    "invalidation_condition":"close below 140"}"#,
            ),
            &account(1_000.0, vec![]),
            &market(),
        );
        let Verdict::Accept(Intent::Enter(intent)) = verdict else {
            panic!("expected entry, got {:?}", verdict);
        };
        assert_eq!(intent.leverage, 10);
        // 50 * 10 / 150 = 3.333.. floored to one decimal
        assert_eq!(intent.quantity, 3.3);
        assert_eq!(intent.profit_target, Some(160.0));
        assert_eq!(intent.invalidation.as_deref(), Some("close below 140"));

        let [tp, sl] = OrderRequest::bracket(&intent).unwrap();
        let entry = OrderRequest::entry(&intent);
        assert_ne!(tp.side, entry.side);
        assert_ne!(sl.side, entry.side);
    }

    #[test]
    fn dust_quantity_is_rejected() {
        let verdict = gate(TradingMode::Baseline).evaluate(
            &decision(r#"{"signal":"buy_to_enter","coin":"DOGE","confidence":0.9,"quantity":0.4}"#),
            &account(1_000.0, vec![]),
            &market(),
        );
        assert_eq!(
            verdict,
            Verdict::Reject {
                reason: Rejection::ZeroQuantity("DOGEUSDT".into())
            }
        );
    }

    #[test]
    fn inverted_bracket_is_rejected() {
        let verdict = gate(TradingMode::Baseline).evaluate(
            &decision(
                r#"{"signal":"sell_to_enter","coin":"ETH","confidence":0.9,"quantity":0.1,
                    "profit_target":3100,"stop_loss":2900}"#,
            ),
            &account(10_000.0, vec![]),
            &market(),
        );
        assert!(matches!(
            verdict,
            Verdict::Reject {
                reason: Rejection::InvertedBracket { side: Side::Short, .. }
            }
        ));
    }

    #[test]
    fn field_and_symbol_problems_are_rejected() {
        let gate = gate(TradingMode::Baseline);
        let account = account(10_000.0, vec![position("BTCUSDT", Side::Long, 0.1)]);
        let cases = [
            (r#"{"signal":"buy_to_enter","confidence":0.9}"#, Rejection::MissingSymbol),
            (
                r#"{"signal":"buy_to_enter","coin":"PEPE","confidence":0.9}"#,
                Rejection::UnknownSymbol("PEPE".into()),
            ),
            (
                r#"{"signal":"buy_to_enter","coin":"BTC","confidence":0.9}"#,
                Rejection::PositionAlreadyOpen("BTCUSDT".into()),
            ),
        ];
        for (json, expected) in cases {
            assert_eq!(
                gate.evaluate(&decision(json), &account, &market()),
                Verdict::Reject { reason: expected }
            );
        }

        for json in [
            r#"{"signal":"buy_to_enter","coin":"SOL"}"#,
            r#"{"signal":"buy_to_enter","coin":"SOL","confidence":1.5}"#,
            r#"{"signal":"buy_to_enter","coin":"SOL","confidence":0.9,"size_percent":250}"#,
        ] {
            assert!(matches!(
                gate.evaluate(&decision(json), &account, &market()),
                Verdict::Reject {
                    reason: Rejection::InvalidField { .. }
                }
            ));
        }
    }

    #[test]
    fn missing_market_data_blocks_entries() {
        let market = MarketSnapshot::new(vec![(
            "SOLUSDT".into(),
            SymbolMarket::Unavailable {
                reason: "timeout".into(),
            },
        )]);
        let verdict = gate(TradingMode::Baseline).evaluate(
            &decision(r#"{"signal":"buy_to_enter","coin":"SOL","confidence":0.9}"#),
            &account(1_000.0, vec![]),
            &market,
        );
        assert_eq!(
            verdict,
            Verdict::Reject {
                reason: Rejection::MarketUnavailable("SOLUSDT".into())
            }
        );
    }
}
