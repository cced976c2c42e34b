pub mod account_response;
pub mod binance_client;
pub mod kline_response;
pub mod order_response;

pub use binance_client::BinanceClient;
