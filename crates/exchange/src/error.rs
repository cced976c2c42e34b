use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The request may or may not have reached the matching engine.
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },
    /// The exchange answered 2xx but the body could not be read or decoded,
    /// so a write may have been applied.
    #[error("{endpoint} accepted the request but the response was unreadable: {reason}")]
    Unreadable { endpoint: String, reason: String },
    #[error("exchange returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("rate limited by exchange (HTTP {0})")]
    RateLimited(u16),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid number in field {field}: `{value}`")]
    InvalidNumber { field: &'static str, value: String },
}

impl ExchangeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether a write may have reached the exchange despite the error.
    pub fn is_outcome_unknown(&self) -> bool {
        self.is_timeout() || matches!(self, Self::Unreadable { .. })
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

pub(crate) fn parse_number(field: &'static str, value: &str) -> Result<f64, ExchangeError> {
    value.trim().parse::<f64>().map_err(|_| ExchangeError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
