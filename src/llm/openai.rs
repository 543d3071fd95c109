use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::{
    config::{LlmConfig, LlmProvider},
    error::SummarizeError,
};

use super::{non_empty, successful_json, user_prompt, Summarizer, SYSTEM_PROMPT};

/// Client of the `chat/completions` API spoken by OpenAI, OpenRouter and Ollama.
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    provider: LlmProvider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(client: reqwest::Client, config: &LlmConfig) -> Self {
        Self {
            client,
            provider: config.provider,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

pub fn extract_content(body: &Value) -> Option<String> {
    body.get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(|v| v.to_string())
}

#[async_trait]
impl Summarizer for OpenAiCompatibleClient {
    #[instrument(skip(self, evidence))]
    async fn summarize(&self, date: NaiveDate, evidence: &str) -> Result<String, SummarizeError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt(date, evidence)}
            ]
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .json(&payload);
        match (&self.api_key, self.provider.requires_api_key()) {
            (Some(key), _) => request = request.bearer_auth(key),
            (None, true) => return Err(SummarizeError::MissingApiKey(self.describe())),
            (None, false) => (),
        }
        if self.provider == LlmProvider::OpenRouter {
            request = request.header("X-Title", "dayrecap");
        }

        let body = successful_json(request.send().await?).await?;
        debug!("Received completion from {}", self.describe());
        non_empty(extract_content(&body).ok_or(SummarizeError::EmptyResponse)?)
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.provider.name(), self.model)
    }
}
