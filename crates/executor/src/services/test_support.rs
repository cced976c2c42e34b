//! Hand-written recording fakes for the exchange and model seams.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use common::models::{AccountSnapshot, Candle, OrderAck, OrderRequest};
use exchange::{AccountFeed, ExchangeError, MarketFeed, OrderGateway};
use strategy::llm::{ChatRequest, LlmClient, LlmError};

pub fn candles_to(price: f64) -> Vec<Candle> {
    (0..100)
        .map(|i| {
            let close = price * (0.9 + 0.001 * i as f64);
            Candle {
                open_time: i * 900_000,
                close_time: (i + 1) * 900_000 - 1,
                open_price: close,
                high_price: close,
                low_price: close,
                close_price: close,
                volume: 10.0,
            }
        })
        .collect()
}

#[derive(Default)]
pub struct FakeMarket {
    prices: HashMap<String, f64>,
    failing: HashSet<String>,
}

impl FakeMarket {
    pub fn trending(prices: &[(&str, f64)]) -> Self {
        Self {
            prices: prices.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
            failing: HashSet::new(),
        }
    }

    pub fn failing(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    fn price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        if self.failing.contains(symbol) {
            return Err(ExchangeError::Timeout {
                endpoint: "/fapi/v1/klines".into(),
            });
        }
        self.prices.get(symbol).copied().ok_or(ExchangeError::Api {
            status: 400,
            body: format!("unknown symbol {}", symbol),
        })
    }
}

#[async_trait]
impl MarketFeed for FakeMarket {
    async fn klines(
        &self,
        symbol: &str,
        _interval: &str,
        _limit: u16,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.price(symbol).map(candles_to)
    }

    async fn last_price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        self.price(symbol)
    }
}

/// Serves a fixed account, or an error while `fail` is set.
pub struct FakeAccount {
    snapshot: Mutex<AccountSnapshot>,
    fail: Mutex<bool>,
    calls: Mutex<usize>,
}

impl FakeAccount {
    pub fn new(snapshot: AccountSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            fail: Mutex::new(false),
            calls: Mutex::new(0),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl AccountFeed for FakeAccount {
    async fn account_snapshot(&self) -> Result<AccountSnapshot, ExchangeError> {
        *self.calls.lock().unwrap() += 1;
        if *self.fail.lock().unwrap() {
            return Err(ExchangeError::Timeout {
                endpoint: "/fapi/v2/account".into(),
            });
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    Reject,
    Timeout,
    /// Accepted with a 2xx, but the acknowledgement could not be read.
    Unreadable,
}

impl FailMode {
    fn error(self) -> ExchangeError {
        match self {
            Self::Reject => ExchangeError::Api {
                status: 400,
                body: r#"{"code":-2019,"msg":"Margin is insufficient."}"#.into(),
            },
            Self::Timeout => ExchangeError::Timeout {
                endpoint: "/fapi/v1/order".into(),
            },
            Self::Unreadable => ExchangeError::Unreadable {
                endpoint: "/fapi/v1/order".into(),
                reason: "EOF while parsing an object at line 1 column 31".into(),
            },
        }
    }
}

#[derive(Default)]
pub struct RecordingGateway {
    orders: Mutex<Vec<OrderRequest>>,
    leverage: Mutex<Vec<(String, u32)>>,
    entry_failure: Option<FailMode>,
    leverage_failure: bool,
}

impl RecordingGateway {
    pub fn with_entry_failure(mut self, mode: FailMode) -> Self {
        self.entry_failure = Some(mode);
        self
    }

    pub fn with_leverage_failure(mut self) -> Self {
        self.leverage_failure = true;
        self
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }

    pub fn leverage_calls(&self) -> Vec<(String, u32)> {
        self.leverage.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderGateway for RecordingGateway {
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        self.leverage
            .lock()
            .unwrap()
            .push((symbol.to_string(), leverage));
        if self.leverage_failure {
            return Err(FailMode::Reject.error());
        }
        Ok(())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        let order_id = {
            let mut orders = self.orders.lock().unwrap();
            orders.push(order.clone());
            orders.len() as u64
        };
        if let Some(mode) = self.entry_failure.filter(|_| !order.reduce_only) {
            return Err(mode.error());
        }
        Ok(OrderAck {
            order_id,
            status: "FILLED".into(),
            avg_price: None,
            executed_qty: order.quantity,
        })
    }
}

/// Replies with queued completions in order and records every request.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlm {
    pub fn replying(replies: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::InvalidResponse("no scripted reply".into())))
    }
}
