use std::fmt;

use chrono::{DateTime, Utc};

use crate::models::account::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerAction {
    Open(Side),
    Close,
}

impl fmt::Display for LedgerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(Side::Long) => f.write_str("OPEN_LONG"),
            Self::Open(Side::Short) => f.write_str("OPEN_SHORT"),
            Self::Close => f.write_str("CLOSE"),
        }
    }
}

/// An action the exchange confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub action: LedgerAction,
    pub symbol: String,
    pub justification: String,
    pub price: f64,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
}
