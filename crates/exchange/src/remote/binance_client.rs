use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use common::config::ExchangeCredentials;
use common::models::{AccountSnapshot, Candle, OrderAck, OrderRequest};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{
    error::ExchangeError,
    remote::{
        account_response::{AccountResponse, FuturesAccountResponse, PositionRiskResponse},
        kline_response::{KlineRow, TickerPriceResponse},
        order_response::{LeverageResponse, OrderResponse},
    },
    traits::{AccountFeed, MarketFeed, OrderGateway, RemoteResponse},
};

type HmacSha256 = Hmac<Sha256>;

const RECV_WINDOW_MS: u64 = 5_000;
const MAX_READ_RETRIES: u32 = 3;
const ENDPOINT_ORDER: &str = "/fapi/v1/order";

/// Signed REST client for Binance USDⓈ-M futures.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
}

impl BinanceClient {
    pub fn new(credentials: &ExchangeCredentials) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .user_agent("arena_trader/0.1.0")
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: credentials.base_url.trim_end_matches('/').to_string(),
            api_key: credentials.api_key.clone(),
            secret_key: credentials.secret_key.clone(),
        })
    }

    fn sign(&self, query: &str) -> String {
        sign_query(&self.secret_key, query)
    }

    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();

        let mut query = encode_params(params);
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!("recvWindow={}&timestamp={}", RECV_WINDOW_MS, timestamp));

        let signature = self.sign(&query);
        format!("{}&signature={}", query, signature)
    }

    /// Reads are idempotent, so rate-limit responses back off and retry.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> Result<T, ExchangeError> {
        let mut retry_count = 0;

        loop {
            let query = if signed {
                self.signed_query(params)
            } else {
                encode_params(params)
            };
            let url = format!("{}{}?{}", self.base_url, path, query);

            match self.send(Method::GET, path, &url, signed).await {
                Err(e) if e.is_rate_limit() && retry_count < MAX_READ_RETRIES => {
                    retry_count += 1;
                    let backoff_seconds = 2_u64.pow(retry_count);
                    warn!(
                        "Rate limited on {}, backing off for {} seconds (attempt {}/{})",
                        path, backoff_seconds, retry_count, MAX_READ_RETRIES
                    );
                    sleep(Duration::from_secs(backoff_seconds)).await;
                }
                Err(e) => return Err(e),
                Ok(resp) => {
                    return resp.json::<T>().await.map_err(|e| {
                        if e.is_timeout() {
                            ExchangeError::Timeout {
                                endpoint: path.to_string(),
                            }
                        } else {
                            ExchangeError::Http(e)
                        }
                    });
                }
            }
        }
    }

    /// Writes are sent exactly once.
    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{}?{}", self.base_url, path, self.signed_query(params));
        let resp = self.send(Method::POST, path, &url, true).await?;

        // Past this point the exchange has accepted the request.
        let body = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                ExchangeError::Timeout {
                    endpoint: path.to_string(),
                }
            } else {
                unreadable(path, e)
            }
        })?;
        decode_accepted(path, &body)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        url: &str,
        signed: bool,
    ) -> Result<Response, ExchangeError> {
        let mut request = self.client.request(method, url);
        if signed {
            request = request.header("X-MBX-APIKEY", &self.api_key);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ExchangeError::Timeout {
                    endpoint: path.to_string(),
                }
            } else {
                ExchangeError::Http(e)
            }
        })?;

        let status = resp.status();
        if status.as_u16() == 429 || status.as_u16() == 418 {
            return Err(ExchangeError::RateLimited(status.as_u16()));
        }

        if let Some(used_weight) = resp
            .headers()
            .get("x-mbx-used-weight-1m")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok())
        {
            if used_weight > 1000 {
                warn!("High API weight usage: {}", used_weight);
            } else {
                debug!("Used weights: {}/2400", used_weight);
            }
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("Binance {} failed: {} {}", path, status, body);
            return Err(ExchangeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp)
    }
}

#[async_trait]
impl MarketFeed for BinanceClient {
    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u16,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let rows: Vec<KlineRow> = self
            .get(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
                false,
            )
            .await?;
        rows.iter().map(|row| row.to_model()).collect()
    }

    async fn last_price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        let ticker: TickerPriceResponse = self
            .get("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())], false)
            .await?;
        ticker.to_model()
    }
}

#[async_trait]
impl AccountFeed for BinanceClient {
    async fn account_snapshot(&self) -> Result<AccountSnapshot, ExchangeError> {
        let (account, positions) = tokio::try_join!(
            self.get::<FuturesAccountResponse>("/fapi/v2/account", &[], true),
            self.get::<Vec<PositionRiskResponse>>("/fapi/v2/positionRisk", &[], true),
        )?;
        AccountResponse { account, positions }.to_model()
    }
}

#[async_trait]
impl OrderGateway for BinanceClient {
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        let resp: LeverageResponse = self
            .post(
                "/fapi/v1/leverage",
                &[
                    ("symbol", symbol.to_string()),
                    ("leverage", leverage.to_string()),
                ],
            )
            .await?;
        debug!("Leverage for {} set to {}x", resp.symbol, resp.leverage);
        Ok(())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        info!(
            "Placing Order: {} {} {} {}{}",
            order.kind.as_str(),
            order.side,
            order.precision.format_quantity(order.quantity),
            order.symbol,
            if order.reduce_only { " (reduce-only)" } else { "" }
        );
        let resp: OrderResponse = self.post(ENDPOINT_ORDER, &order_params(order)).await?;
        resp.to_model().map_err(|e| unreadable(ENDPOINT_ORDER, e))
    }
}

pub(crate) fn sign_query(secret_key: &str, query: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn unreadable(path: &str, reason: impl std::fmt::Display) -> ExchangeError {
    ExchangeError::Unreadable {
        endpoint: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Decodes the body of a write the exchange already accepted.
pub(crate) fn decode_accepted<T: DeserializeOwned>(
    path: &str,
    body: &str,
) -> Result<T, ExchangeError> {
    serde_json::from_str(body).map_err(|e| unreadable(path, e))
}

fn encode_params(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

pub(crate) fn order_params(order: &OrderRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("symbol", order.symbol.clone()),
        ("side", order.side.as_str().to_string()),
        ("type", order.kind.as_str().to_string()),
        ("quantity", order.precision.format_quantity(order.quantity)),
    ];
    if let Some(stop_price) = order.kind.stop_price() {
        params.push(("stopPrice", order.precision.format_price(stop_price)));
    }
    if order.reduce_only {
        params.push(("reduceOnly", "true".to_string()));
    }
    params.push(("newOrderRespType", "RESULT".to_string()));
    params
}
