use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::{config::LlmConfig, error::SummarizeError};

use super::{non_empty, successful_json, user_prompt, Summarizer, SYSTEM_PROMPT};

const API_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 4096;

/// Client of the Anthropic `messages` API.
pub struct AnthropicClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl AnthropicClient {
    pub fn new(client: reqwest::Client, config: &LlmConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

/// Concatenates every text block of the response.
pub fn extract_text(body: &Value) -> Option<String> {
    let blocks = body.get("content")?.as_array()?;
    let text = blocks
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");
    Some(text)
}

#[async_trait]
impl Summarizer for AnthropicClient {
    #[instrument(skip(self, evidence))]
    async fn summarize(&self, date: NaiveDate, evidence: &str) -> Result<String, SummarizeError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SummarizeError::MissingApiKey(self.describe()))?;

        let payload = json!({
            "model": self.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "system": SYSTEM_PROMPT,
            "messages": [
                {"role": "user", "content": user_prompt(date, evidence)}
            ]
        });

        let response = self
            .client
            .post(format!("{}/messages", self.endpoint))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&payload)
            .send()
            .await?;

        let body = successful_json(response).await?;
        debug!("Received message from {}", self.describe());
        non_empty(extract_text(&body).ok_or(SummarizeError::EmptyResponse)?)
    }

    fn describe(&self) -> String {
        format!("anthropic/{}", self.model)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{extract_text, AnthropicClient};
    use crate::{
        config::{LlmConfig, LlmProvider},
        error::SummarizeError,
        llm::{test_server::serve_once, Summarizer},
    };

    fn config(endpoint: String) -> LlmConfig {
        LlmConfig {
            provider: LlmProvider::Anthropic,
            model: "claude-sonnet".into(),
            api_key: Some("key".into()),
            endpoint,
        }
    }

    #[test]
    fn test_extract_text() {
        let body = json!({
            "content": [
                {"type": "text", "text": "First. "},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "Second."}
            ]
        });
        assert_eq!(extract_text(&body), Some("First. Second.".into()));
        assert_eq!(extract_text(&json!({})), None);
    }

    #[tokio::test]
    async fn test_rate_limit_and_empty_response() {
        let date = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();

        let url = serve_once("429 Too Many Requests", r#"{"error":"slow down"}"#).await;
        let client = AnthropicClient::new(reqwest::Client::new(), &config(url));
        let error = client.summarize(date, "evidence").await.unwrap_err();
        assert!(matches!(error, SummarizeError::RateLimited(_)));

        let url = serve_once("200 OK", r#"{"content":[]}"#).await;
        let client = AnthropicClient::new(reqwest::Client::new(), &config(url));
        let error = client.summarize(date, "evidence").await.unwrap_err();
        assert!(matches!(error, SummarizeError::EmptyResponse));
    }
}
