use common::models::Candle;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{ExchangeError, parse_number},
    traits::RemoteResponse,
};

/// `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`
#[derive(Debug, Deserialize)]
pub struct KlineRow(pub Vec<Value>);

impl KlineRow {
    fn int(&self, index: usize, field: &'static str) -> Result<i64, ExchangeError> {
        self.0
            .get(index)
            .and_then(Value::as_i64)
            .ok_or_else(|| ExchangeError::InvalidNumber {
                field,
                value: format!("{:?}", self.0.get(index)),
            })
    }

    fn decimal(&self, index: usize, field: &'static str) -> Result<f64, ExchangeError> {
        match self.0.get(index) {
            Some(Value::String(s)) => parse_number(field, s),
            Some(Value::Number(n)) => n.as_f64().ok_or_else(|| ExchangeError::InvalidNumber {
                field,
                value: n.to_string(),
            }),
            other => Err(ExchangeError::InvalidNumber {
                field,
                value: format!("{:?}", other),
            }),
        }
    }
}

impl RemoteResponse<Candle> for KlineRow {
    fn to_model(&self) -> Result<Candle, ExchangeError> {
        Ok(Candle {
            open_time: self.int(0, "openTime")?,
            open_price: self.decimal(1, "open")?,
            high_price: self.decimal(2, "high")?,
            low_price: self.decimal(3, "low")?,
            close_price: self.decimal(4, "close")?,
            volume: self.decimal(5, "volume")?,
            close_time: self.int(6, "closeTime")?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TickerPriceResponse {
    pub symbol: String,
    pub price: String,
}

impl RemoteResponse<f64> for TickerPriceResponse {
    fn to_model(&self) -> Result<f64, ExchangeError> {
        parse_number("price", &self.price)
    }
}
