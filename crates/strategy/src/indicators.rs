use common::models::{Candle, MarketQuote, Trend};
use ta::Next;
use ta::indicators::{
    ExponentialMovingAverage, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
};

pub const RSI_PERIOD: usize = 14;
pub const EMA_FAST: usize = 20;
pub const EMA_SLOW: usize = 50;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;

struct IndicatorState {
    rsi: RelativeStrengthIndex,
    macd: MovingAverageConvergenceDivergence,
    ema_fast: ExponentialMovingAverage,
    ema_slow: ExponentialMovingAverage,
}

impl IndicatorState {
    fn new() -> Option<Self> {
        Some(Self {
            // Standard RSI(14)
            rsi: RelativeStrengthIndex::new(RSI_PERIOD).ok()?,
            // MACD(12, 26, 9)
            macd: MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL).ok()?,
            ema_fast: ExponentialMovingAverage::new(EMA_FAST).ok()?,
            ema_slow: ExponentialMovingAverage::new(EMA_SLOW).ok()?,
        })
    }
}

/// Builds the per-symbol quote from candle closes and the live price.
/// `None` when there is nothing to compute from or the price is unusable.
pub fn quote_from_candles(candles: &[Candle], price: f64) -> Option<MarketQuote> {
    if candles.is_empty() || !(price.is_finite() && price > 0.0) {
        return None;
    }

    let mut state = IndicatorState::new()?;
    let mut rsi = 0.0;
    let mut macd = (0.0, 0.0);
    let mut ema_fast = 0.0;
    let mut ema_slow = 0.0;

    for candle in candles {
        let close = candle.close_price;
        rsi = state.rsi.next(close);
        let out = state.macd.next(close);
        macd = (out.macd, out.signal);
        ema_fast = state.ema_fast.next(close);
        ema_slow = state.ema_slow.next(close);
    }

    // Warm-up: report absent rather than a half-formed value.
    let rsi = (candles.len() > RSI_PERIOD).then_some(rsi.clamp(0.0, 100.0));
    let macd_ready = candles.len() >= MACD_SLOW + MACD_SIGNAL - 1;

    Some(MarketQuote {
        price,
        rsi,
        macd: macd_ready.then_some(macd.0),
        macd_signal: macd_ready.then_some(macd.1),
        ema_fast,
        ema_slow,
        volume: candles.iter().map(|c| c.volume).sum(),
        trend: Trend::from_emas(ema_fast, ema_slow),
    })
}
