use common::models::OrderAck;
use serde::Deserialize;

use crate::{
    error::{ExchangeError, parse_number},
    traits::RemoteResponse,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: u64,
    pub symbol: String,
    pub status: String,
    #[serde(default)]
    pub avg_price: Option<String>,
    #[serde(default)]
    pub executed_qty: Option<String>,
}

impl RemoteResponse<OrderAck> for OrderResponse {
    fn to_model(&self) -> Result<OrderAck, ExchangeError> {
        let avg_price = match self.avg_price.as_deref() {
            Some(p) => Some(parse_number("avgPrice", p)?).filter(|p| *p > 0.0),
            None => None,
        };
        let executed_qty = match self.executed_qty.as_deref() {
            Some(q) => parse_number("executedQty", q)?,
            None => 0.0,
        };
        Ok(OrderAck {
            order_id: self.order_id,
            status: self.status.clone(),
            avg_price,
            executed_qty,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct LeverageResponse {
    pub leverage: u32,
    pub symbol: String,
}
