use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => f.write_str("LONG"),
            Self::Short => f.write_str("SHORT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub unrealized_pnl: f64,
    pub leverage: u32,
}

/// Balances and open positions as reported by the exchange for one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountSnapshot {
    pub balance: f64,
    pub unrealized_pnl: f64,
    pub available: f64,
    pub positions: Vec<Position>,
}

impl AccountSnapshot {
    pub fn equity(&self) -> f64 {
        self.balance + self.unrealized_pnl
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Reflects a filled entry locally so later decisions in the same batch
    /// see the new position and the margin it consumed.
    pub fn apply_entry(&mut self, position: Position, margin: f64) {
        self.available = (self.available - margin).max(0.0);
        self.positions.retain(|p| p.symbol != position.symbol);
        self.positions.push(position);
    }

    pub fn apply_close(&mut self, symbol: &str) {
        self.positions.retain(|p| p.symbol != symbol);
    }
}
