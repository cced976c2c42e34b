use async_trait::async_trait;

use common::models::{AccountSnapshot, Candle, OrderAck, OrderRequest};

use crate::error::ExchangeError;

pub trait RemoteResponse<T> {
    fn to_model(&self) -> Result<T, ExchangeError>;
}

/// Pull-only market data.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u16,
    ) -> Result<Vec<Candle>, ExchangeError>;

    async fn last_price(&self, symbol: &str) -> Result<f64, ExchangeError>;
}

#[async_trait]
pub trait AccountFeed: Send + Sync {
    async fn account_snapshot(&self) -> Result<AccountSnapshot, ExchangeError>;
}

#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ExchangeError>;
}
