use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Bullish,
    Bearish,
}

impl Trend {
    pub fn from_emas(ema_fast: f64, ema_slow: f64) -> Self {
        if ema_fast > ema_slow {
            Self::Bullish
        } else {
            Self::Bearish
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bullish => f.write_str("BULLISH"),
            Self::Bearish => f.write_str("BEARISH"),
        }
    }
}

/// Price plus the indicator set for one symbol in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketQuote {
    pub price: f64,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub volume: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolMarket {
    Available(MarketQuote),
    /// Data could not be fetched this cycle. Never traded on.
    Unavailable { reason: String },
}

/// Immutable per-cycle view of the universe, in universe order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketSnapshot {
    entries: Vec<(String, SymbolMarket)>,
}

impl MarketSnapshot {
    pub fn new(entries: Vec<(String, SymbolMarket)>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, SymbolMarket)] {
        &self.entries
    }

    pub fn quote(&self, symbol: &str) -> Option<&MarketQuote> {
        self.entries.iter().find_map(|(s, m)| match m {
            SymbolMarket::Available(q) if s == symbol => Some(q),
            _ => None,
        })
    }

    pub fn available(&self) -> impl Iterator<Item = (&str, &MarketQuote)> {
        self.entries.iter().filter_map(|(s, m)| match m {
            SymbolMarket::Available(q) => Some((s.as_str(), q)),
            SymbolMarket::Unavailable { .. } => None,
        })
    }

    pub fn available_count(&self) -> usize {
        self.available().count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
