//! Chat-completion client used to validate strategy matches.
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::taxonomy::Strategy;
use crate::util::http::{build_client, truncate_for_log, USER_AGENT};
use crate::util::retry::{retry, RetryPolicy};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that provides concise answers.";

#[derive(Debug, thiserror::Error)]
pub enum OpenAiError {
    #[error("LLM API rejected the API key")]
    Unauthorized,
    #[error("LLM request failed: {status} body={body}")]
    Status { status: u16, body: String },
    #[error("LLM response contained no choices")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: String) -> Self {
        Self {
            role: "user".into(),
            content,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Messages asking whether `company` can apply `strategy`.
pub fn build_messages(
    company: &str,
    city: &str,
    country: &str,
    description: &str,
    strategy: &Strategy,
) -> Vec<ChatMessage> {
    let user = format!(
        "Analyze if the company '{company}' located in {city}, {country}, with the description \
         '{description}', can apply the circular economy strategy '{name}' defined as \
         '{definition}'. If you agree, provide the output in the format: {code}: {name}. \
         If you disagree, respond with 'Disagree' and give a short explanation.",
        name = strategy.name,
        definition = strategy.definition,
        code = strategy.code,
    );
    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: String,
    http: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<&str>,
        api_key: &str,
        model: Option<&str>,
        timeout_secs: u64,
        retry: RetryPolicy,
    ) -> Result<Self> {
        Ok(Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            http: build_client(USER_AGENT, timeout_secs)?,
            api_key: api_key.to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            max_tokens: 100,
            temperature: 0.7,
            retry,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// GET `/models`; any non-200 is an error.
    pub async fn check_connectivity(&self) -> Result<()> {
        let url = format!("{}/models", self.base_url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(OpenAiError::Unauthorized.into());
        }
        if !status.is_success() {
            let body = truncate_for_log(resp.text().await.unwrap_or_default(), 400);
            error!(status = status.as_u16(), "LLM API is not reachable");
            return Err(OpenAiError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        info!(model = %self.model, "LLM API is reachable");
        Ok(())
    }

    async fn complete_once(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(OpenAiError::Unauthorized.into());
        }
        if !status.is_success() {
            let body = truncate_for_log(resp.text().await.unwrap_or_default(), 800);
            return Err(OpenAiError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        let parsed: ChatResponse = resp.json().await.context("decoding chat completion")?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or(OpenAiError::EmptyResponse)?;
        debug!(chars = answer.len(), "received LLM answer");
        Ok(answer)
    }

    /// Chat completion with retry; returns the first choice, trimmed.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        retry(&self.retry, "chat completion", move || async move {
            self.complete_once(messages).await
        })
        .await
    }
}
