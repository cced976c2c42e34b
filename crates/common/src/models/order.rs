use std::fmt;

use crate::models::account::Side;
use crate::models::decision::{CloseIntent, EntryIntent};
use crate::symbols::Precision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Side that opens (or adds to) a position of `side`.
    pub fn opening(side: Side) -> Self {
        match side {
            Side::Long => Self::Buy,
            Side::Short => Self::Sell,
        }
    }

    /// Side that reduces a position of `side`.
    pub fn closing(side: Side) -> Self {
        Self::opening(side.opposite())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderKind {
    Market,
    TakeProfitMarket { stop_price: f64 },
    StopMarket { stop_price: f64 },
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::TakeProfitMarket { .. } => "TAKE_PROFIT_MARKET",
            Self::StopMarket { .. } => "STOP_MARKET",
        }
    }

    pub fn stop_price(&self) -> Option<f64> {
        match self {
            Self::Market => None,
            Self::TakeProfitMarket { stop_price } | Self::StopMarket { stop_price } => {
                Some(*stop_price)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: f64,
    pub reduce_only: bool,
    pub precision: Precision,
}

impl OrderRequest {
    pub fn entry(intent: &EntryIntent) -> Self {
        Self {
            symbol: intent.symbol.clone(),
            side: OrderSide::opening(intent.side),
            kind: OrderKind::Market,
            quantity: intent.quantity,
            reduce_only: false,
            precision: intent.precision,
        }
    }

    /// Reduce-only take-profit and stop-loss legs, inverted from the entry side.
    pub fn bracket(intent: &EntryIntent) -> Option<[Self; 2]> {
        let (target, stop) = intent.bracket()?;
        let leg = |kind| Self {
            symbol: intent.symbol.clone(),
            side: OrderSide::closing(intent.side),
            kind,
            quantity: intent.quantity,
            reduce_only: true,
            precision: intent.precision,
        };
        Some([
            leg(OrderKind::TakeProfitMarket { stop_price: target }),
            leg(OrderKind::StopMarket { stop_price: stop }),
        ])
    }

    pub fn close(intent: &CloseIntent) -> Self {
        Self {
            symbol: intent.symbol.clone(),
            side: OrderSide::closing(intent.position_side),
            kind: OrderKind::Market,
            quantity: intent.quantity,
            reduce_only: true,
            precision: intent.precision,
        }
    }
}

/// Exchange acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: u64,
    pub status: String,
    pub avg_price: Option<f64>,
    pub executed_qty: f64,
}
