use common::models::{AccountSnapshot, Position, Side};
use serde::Deserialize;

use crate::{
    error::{ExchangeError, parse_number},
    traits::RemoteResponse,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesAccountResponse {
    pub total_wallet_balance: String,
    pub total_unrealized_profit: String,
    pub available_balance: String,
}

#[derive(Debug, Deserialize)]
pub struct PositionRiskResponse {
    pub symbol: String,
    #[serde(rename = "positionAmt")]
    pub position_amt: String,
    #[serde(rename = "entryPrice")]
    pub entry_price: String,
    #[serde(rename = "unRealizedProfit")]
    pub unrealized_profit: String,
    pub leverage: String,
}

impl PositionRiskResponse {
    /// `None` for flat rows; the endpoint lists every symbol.
    fn to_position(&self) -> Result<Option<Position>, ExchangeError> {
        let amount = parse_number("positionAmt", &self.position_amt)?;
        if amount == 0.0 {
            return Ok(None);
        }
        Ok(Some(Position {
            symbol: self.symbol.clone(),
            side: if amount > 0.0 { Side::Long } else { Side::Short },
            size: amount.abs(),
            entry_price: parse_number("entryPrice", &self.entry_price)?,
            unrealized_pnl: parse_number("unRealizedProfit", &self.unrealized_profit)?,
            leverage: parse_number("leverage", &self.leverage)? as u32,
        }))
    }
}

pub struct AccountResponse {
    pub account: FuturesAccountResponse,
    pub positions: Vec<PositionRiskResponse>,
}

impl RemoteResponse<AccountSnapshot> for AccountResponse {
    fn to_model(&self) -> Result<AccountSnapshot, ExchangeError> {
        let mut positions = Vec::new();
        for row in &self.positions {
            if let Some(position) = row.to_position()? {
                positions.push(position);
            }
        }

        Ok(AccountSnapshot {
            balance: parse_number("totalWalletBalance", &self.account.total_wallet_balance)?,
            unrealized_pnl: parse_number(
                "totalUnrealizedProfit",
                &self.account.total_unrealized_profit,
            )?,
            available: parse_number("availableBalance", &self.account.available_balance)?,
            positions,
        })
    }
}
