//! Generation of the daily report from evidence.
//! [Summarizer] is the seam the daemon talks to, [openai::OpenAiCompatibleClient] and
//! [anthropic::AnthropicClient] implement it over HTTP.

pub mod anthropic;
pub mod openai;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
#[cfg(test)]
use mockall::automock;
use reqwest::StatusCode;

use crate::{
    config::{LlmConfig, LlmProvider},
    error::SummarizeError,
};

use self::{anthropic::AnthropicClient, openai::OpenAiCompatibleClient};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub const SYSTEM_PROMPT: &str = "\
You write a short daily work report for a software developer.
You receive a chronological log of what happened on their machine during the day: files that \
were added, deleted, renamed or modified (with excerpts of the diff), and snapshots of their \
terminal panes (with the last command they ran when known).
Write in markdown. Start with a two or three sentence overview, then list the main pieces of \
work as bullet points grouped by project or topic, then mention open threads that seem \
unfinished. Infer intent from file names, diffs and commands but don't invent work that the \
log doesn't support. Don't list every file, don't repeat the raw log.";

pub fn user_prompt(date: NaiveDate, evidence: &str) -> String {
    format!(
        "Activity log for {}:\n\n{evidence}",
        date.format("%A, %B %-d, %Y")
    )
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produces the report text for `date` out of the rendered evidence.
    async fn summarize(&self, date: NaiveDate, evidence: &str) -> Result<String, SummarizeError>;

    /// Human readable `provider/model`.
    fn describe(&self) -> String;
}

pub fn build_summarizer(config: &LlmConfig) -> Result<Box<dyn Summarizer>, SummarizeError> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    Ok(match config.provider {
        LlmProvider::Anthropic => Box::new(AnthropicClient::new(client, config)),
        LlmProvider::OpenAI | LlmProvider::OpenRouter | LlmProvider::Ollama => {
            Box::new(OpenAiCompatibleClient::new(client, config))
        }
    })
}

/// Maps an unsuccessful provider response to an error the caller can act on.
pub fn classify_failure(status: StatusCode, body: &str) -> SummarizeError {
    let message = body.trim().chars().take(500).collect::<String>();
    let mentions_quota = {
        let lower = message.to_lowercase();
        lower.contains("quota") || lower.contains("credit") || lower.contains("billing")
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SummarizeError::Auth {
            status: status.as_u16(),
            message,
        },
        StatusCode::PAYMENT_REQUIRED => SummarizeError::Quota(message),
        StatusCode::TOO_MANY_REQUESTS if mentions_quota => SummarizeError::Quota(message),
        StatusCode::TOO_MANY_REQUESTS => SummarizeError::RateLimited(message),
        _ => SummarizeError::Provider {
            status: status.as_u16(),
            message,
        },
    }
}

/// Reads the response, turning failure statuses into [SummarizeError].
async fn successful_json(response: reqwest::Response) -> Result<serde_json::Value, SummarizeError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_failure(status, &body));
    }
    Ok(response.json().await?)
}

fn non_empty(text: String) -> Result<String, SummarizeError> {
    if text.trim().is_empty() {
        Err(SummarizeError::EmptyResponse)
    } else {
        Ok(text)
    }
}
