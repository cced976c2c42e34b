use serde::Deserialize;

use crate::models::account::Side;
use crate::symbols::Precision;

/// One decision record exactly as the model emitted it. Nothing here is
/// trusted until the risk gate turns it into an [`Intent`].
///
/// Both decision schemas are accepted: `signal/coin/profit_target/justification`
/// and `action/symbol/take_profit/reasoning`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawDecision {
    #[serde(alias = "action")]
    pub signal: Option<String>,
    #[serde(alias = "symbol")]
    pub coin: Option<String>,
    pub quantity: Option<f64>,
    pub size_percent: Option<f64>,
    pub leverage: Option<f64>,
    #[serde(alias = "take_profit")]
    pub profit_target: Option<f64>,
    pub stop_loss: Option<f64>,
    pub confidence: Option<f64>,
    #[serde(alias = "reasoning")]
    pub justification: Option<String>,
    pub invalidation_condition: Option<String>,
    pub risk_usd: Option<f64>,
}

impl RawDecision {
    pub fn signal(&self) -> Signal {
        self.signal.as_deref().map(Signal::parse).unwrap_or(Signal::Unknown(String::new()))
    }

    pub fn justification_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.justification
            .as_deref()
            .map(str::trim)
            .filter(|j| !j.is_empty())
            .unwrap_or(fallback)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Enter(Side),
    Close,
    Hold,
    Unknown(String),
}

impl Signal {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "buy_to_enter" | "open_long" | "long" | "buy" => Self::Enter(Side::Long),
            "sell_to_enter" | "open_short" | "short" | "sell" => Self::Enter(Side::Short),
            "close" | "close_position" | "exit" => Self::Close,
            "hold" | "wait" | "none" => Self::Hold,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryIntent {
    pub symbol: String,
    pub side: Side,
    pub confidence: f64,
    pub leverage: u32,
    /// Already floored to `precision.quantity`.
    pub quantity: f64,
    /// Snapshot price the size was computed against.
    pub reference_price: f64,
    pub profit_target: Option<f64>,
    pub stop_loss: Option<f64>,
    pub invalidation: Option<String>,
    pub justification: String,
    pub precision: Precision,
}

impl EntryIntent {
    pub fn notional(&self) -> f64 {
        self.quantity * self.reference_price
    }

    pub fn margin(&self) -> f64 {
        self.notional() / self.leverage.max(1) as f64
    }

    /// Both legs of the bracket, when the model supplied usable ones.
    pub fn bracket(&self) -> Option<(f64, f64)> {
        match (self.profit_target, self.stop_loss) {
            (Some(tp), Some(sl)) if tp > 0.0 && sl > 0.0 => Some((tp, sl)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloseIntent {
    pub symbol: String,
    pub position_side: Side,
    pub quantity: f64,
    pub justification: String,
    pub precision: Precision,
}

/// A validated, risk-bounded instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Hold { justification: String },
    Enter(EntryIntent),
    Close(CloseIntent),
}
