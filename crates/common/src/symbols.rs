pub const QUOTE_ASSET: &str = "USDT";

pub const DEFAULT_SYMBOLS: [&str; 6] = [
    "BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT", "DOGEUSDT", "BNBUSDT",
];

/// Ordered set of tradable perpetual symbols, uppercase, quote-suffixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolUniverse {
    symbols: Vec<String>,
}

impl SymbolUniverse {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for s in symbols {
            if let Some(symbol) = normalize(s.as_ref()) {
                if !out.contains(&symbol) {
                    out.push(symbol);
                }
            }
        }
        Self { symbols: out }
    }

    /// Comma or whitespace separated list, e.g. `"btc, ETHUSDT sol"`.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(|c: char| c == ',' || c.is_whitespace()))
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }

    /// Maps a coin or symbol (`"btc"`, `"BTCUSDT"`) onto a member of the universe.
    /// Returns `None` when the resolved symbol is not tradable here.
    pub fn resolve(&self, coin: &str) -> Option<String> {
        normalize(coin).filter(|symbol| self.contains(symbol))
    }
}

impl Default for SymbolUniverse {
    fn default() -> Self {
        Self::new(DEFAULT_SYMBOLS)
    }
}

/// Uppercases, trims and appends the quote asset if missing.
pub fn normalize(coin: &str) -> Option<String> {
    let upper = coin.trim().to_uppercase();
    if upper.is_empty() || !upper.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    if upper.ends_with(QUOTE_ASSET) && upper.len() > QUOTE_ASSET.len() {
        Some(upper)
    } else {
        Some(format!("{}{}", upper, QUOTE_ASSET))
    }
}

/// Decimal places the exchange accepts for a symbol's quantity and price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precision {
    pub quantity: u32,
    pub price: u32,
}

impl Precision {
    pub const FALLBACK: Precision = Precision {
        quantity: 3,
        price: 2,
    };

    pub fn for_symbol(symbol: &str) -> Self {
        let (quantity, price) = match symbol {
            "BTCUSDT" => (3, 1),
            "ETHUSDT" => (3, 2),
            "SOLUSDT" => (1, 2),
            "XRPUSDT" => (0, 4),
            "DOGEUSDT" => (0, 5),
            "BNBUSDT" => (2, 2),
            _ => return Self::FALLBACK,
        };
        Self { quantity, price }
    }

    /// Truncates toward zero so a rounded size never exceeds what was sized.
    pub fn floor_quantity(&self, quantity: f64) -> f64 {
        let factor = 10f64.powi(self.quantity as i32);
        let floored = (quantity * factor + 1e-9).floor() / factor;
        if floored > 0.0 { floored } else { 0.0 }
    }

    pub fn round_price(&self, price: f64) -> f64 {
        let factor = 10f64.powi(self.price as i32);
        (price * factor).round() / factor
    }

    pub fn format_quantity(&self, quantity: f64) -> String {
        format!("{:.*}", self.quantity as usize, quantity)
    }

    pub fn format_price(&self, price: f64) -> String {
        format!("{:.*}", self.price as usize, price)
    }
}
