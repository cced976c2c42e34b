use std::sync::Arc;

use common::models::RawDecision;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use crate::llm::{ChatMessage, ChatRequest, LlmClient, LlmError};

const DECISION_TEMPERATURE: f32 = 0.3;
const DECISION_MAX_TOKENS: u32 = 1000;
const RAW_LOG_LIMIT: usize = 500;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("malformed decision output: {reason}")]
    Malformed { reason: String, raw: String },
}

/// Asks the decision model once per cycle and parses its answer into raw
/// decision records. No retries: a failed call aborts the cycle.
pub struct DecisionOracle {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl DecisionOracle {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub async fn decide(&self, prompt: &str) -> Result<Vec<RawDecision>, OracleError> {
        let request = ChatRequest::new(self.model.clone(), vec![ChatMessage::user(prompt)])
            .with_temperature(DECISION_TEMPERATURE)
            .with_max_tokens(DECISION_MAX_TOKENS);

        let content = self.client.complete(request).await.inspect_err(|e| {
            error!("Decision model call failed: {}", e);
        })?;

        match parse_decisions(&content) {
            Ok(decisions) => {
                info!("Model returned {} decision(s)", decisions.len());
                Ok(decisions)
            }
            Err(e) => {
                error!("Could not parse model output: {}", e);
                error!("Raw response: {}", truncate(&content, RAW_LOG_LIMIT));
                Err(e)
            }
        }
    }
}

/// Removes a surrounding markdown fence (```` ```json ```` or bare ```` ``` ````).
pub fn strip_code_fence(content: &str) -> &str {
    let mut text = content.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// A single object yields one decision, an array of objects yields one per element.
pub fn parse_decisions(content: &str) -> Result<Vec<RawDecision>, OracleError> {
    let malformed = |reason: String| OracleError::Malformed {
        reason,
        raw: truncate(content, RAW_LOG_LIMIT).to_string(),
    };

    let value: Value =
        serde_json::from_str(strip_code_fence(content)).map_err(|e| malformed(e.to_string()))?;

    let items = match value {
        Value::Object(_) => vec![value],
        Value::Array(items) => items,
        other => return Err(malformed(format!("expected object or array, got {}", kind(&other)))),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            if !item.is_object() {
                return Err(malformed(format!("element {} is {}, not an object", i, kind(&item))));
            }
            serde_json::from_value::<RawDecision>(item)
                .map_err(|e| malformed(format!("element {}: {}", i, e)))
        })
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use common::models::{Side, Signal};

    const DECISION: &str = r#"{"signal":"buy_to_enter","coin":"SOL","leverage":10,"profit_target":160,"stop_loss":145,"confidence":0.8,"justification":"breakout"}"#;

    fn oracle_returning(content: impl Into<String>) -> DecisionOracle {
        let content = content.into();
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .withf(|req| req.temperature == Some(0.3) && req.max_tokens == Some(1000))
            .times(1)
            .returning(move |_| Ok(content.clone()));
        DecisionOracle::new(Arc::new(client), "deepseek/deepseek-chat")
    }

    #[tokio::test]
    async fn fenced_output_parses_like_plain_output() {
        let fenced = format!("```json\n{}\n```", DECISION);

        let plain = oracle_returning(DECISION).decide("prompt").await.unwrap();
        let stripped = oracle_returning(fenced).decide("prompt").await.unwrap();

        assert_eq!(plain, stripped);
        assert_eq!(plain[0].signal(), Signal::Enter(Side::Long));
    }

    #[tokio::test]
    async fn array_yields_every_decision() {
        let oracle = oracle_returning(
            r#"[{"signal":"hold","justification":"chop"},{"signal":"close","coin":"ETH"}]"#,
        );
        let decisions = oracle.decide("prompt").await.unwrap();
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[1].signal(), Signal::Close);
    }

    #[tokio::test]
    async fn prose_is_malformed() {
        let oracle = oracle_returning("I think you should buy BTC.");
        let err = oracle.decide("prompt").await.unwrap_err();
        assert!(matches!(err, OracleError::Malformed { .. }));
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .times(1)
            .returning(|_| Err(LlmError::Timeout(60)));
        let oracle = DecisionOracle::new(Arc::new(client), "m");

        let err = oracle.decide("prompt").await.unwrap_err();
        assert!(matches!(err, OracleError::Llm(LlmError::Timeout(60))));
    }

    #[test]
    fn strips_both_fence_styles() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  ```\n[]\n```  "), "[]");
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn rejects_non_object_payloads() {
        assert!(parse_decisions("42").is_err());
        assert!(parse_decisions(r#"[{"signal":"hold"}, "oops"]"#).is_err());
        assert!(parse_decisions(r#"{"signal":"hold","leverage":"ten"}"#).is_err());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(300);
        let cut = truncate(&text, 501);
        assert_eq!(cut.len(), 500);
    }
}
