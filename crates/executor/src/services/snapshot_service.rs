use std::sync::Arc;

use common::models::{MarketSnapshot, SymbolMarket};
use common::symbols::SymbolUniverse;
use exchange::MarketFeed;
use futures_util::future::join_all;
use strategy::indicators::quote_from_candles;
use tracing::{debug, warn};

pub const KLINE_INTERVAL: &str = "15m";
pub const KLINE_LIMIT: u16 = 100;

/// Builds the per-cycle market view. A symbol whose data cannot be fetched
/// is marked unavailable; it never fails the whole snapshot.
pub struct SnapshotService {
    feed: Arc<dyn MarketFeed>,
    universe: SymbolUniverse,
}

impl SnapshotService {
    pub fn new(feed: Arc<dyn MarketFeed>, universe: SymbolUniverse) -> Self {
        Self { feed, universe }
    }

    pub fn universe(&self) -> &SymbolUniverse {
        &self.universe
    }

    pub async fn market_snapshot(&self) -> MarketSnapshot {
        let entries = join_all(self.universe.symbols().iter().map(|symbol| async move {
            (symbol.clone(), self.symbol_market(symbol).await)
        }))
        .await;

        let snapshot = MarketSnapshot::new(entries);
        debug!(
            "Market snapshot: {}/{} symbols available",
            snapshot.available_count(),
            self.universe.len()
        );
        snapshot
    }

    async fn symbol_market(&self, symbol: &str) -> SymbolMarket {
        let (candles, price) = tokio::join!(
            self.feed.klines(symbol, KLINE_INTERVAL, KLINE_LIMIT),
            self.feed.last_price(symbol)
        );

        let unavailable = |reason: String| {
            warn!("No market data for {}: {}", symbol, reason);
            SymbolMarket::Unavailable { reason }
        };

        match (candles, price) {
            (Ok(candles), Ok(price)) => match quote_from_candles(&candles, price) {
                Some(quote) => SymbolMarket::Available(quote),
                None => unavailable(format!(
                    "unusable data ({} candles, price {})",
                    candles.len(),
                    price
                )),
            },
            (Err(e), _) | (_, Err(e)) => unavailable(e.to_string()),
        }
    }
}
