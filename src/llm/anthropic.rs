//! Anthropic Messages API provider over `reqwest`

use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

use super::error::ApiRequestError;
use super::provider::{EventStream, LlmProvider};
use super::types::{
    Message, MessageRequest, MessageResponse, RawStreamEvent, StreamEvent, SystemPrompt,
    ThinkingConfig, ToolDefinition,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Model used when `ANTHROPIC_MODEL` is unset
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
/// Model used for cheap side requests when `ANTHROPIC_SMALL_FAST_MODEL` is unset
pub const DEFAULT_SMALL_FAST_MODEL: &str = "claude-haiku-4-5";
/// Default output token limit
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

const DEFAULT_MAX_RETRIES: u32 = 3;
const BASE_RETRY_DELAY_MS: u64 = 500;
const MAX_RETRY_DELAY_MS: u64 = 8_000;

/// Anthropic LLM provider
#[derive(Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    max_retries: u32,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider from environment variables
    ///
    /// Reads from:
    /// - `ANTHROPIC_API_KEY` (required)
    /// - `ANTHROPIC_MODEL` (optional)
    /// - `ANTHROPIC_BASE_URL` (optional)
    /// - `CODEWRIGHT_MAX_TOKENS` (optional, defaults to 8192)
    pub fn from_env() -> Result<Self> {
        tracing::info!("Creating Anthropic provider from environment");

        let api_key = env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set")?;

        let mut provider = Self::new(api_key);

        if let Ok(model) = env::var("ANTHROPIC_MODEL") {
            provider.model = model;
        }
        if let Ok(base_url) = env::var("ANTHROPIC_BASE_URL") {
            provider.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(max_tokens) = env::var("CODEWRIGHT_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            provider.max_tokens = max_tokens;
        }

        tracing::info!(model = %provider.model, max_tokens = provider.max_tokens, "Anthropic provider ready");
        Ok(provider)
    }

    /// Create a new Anthropic provider with a specific API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// The small fast model name from the environment
    pub fn small_fast_model_from_env() -> String {
        env::var("ANTHROPIC_SMALL_FAST_MODEL").unwrap_or_else(|_| DEFAULT_SMALL_FAST_MODEL.to_string())
    }

    /// Set the model to use
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the max tokens for responses
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set how many times a failed request is retried
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn build_request(
        &self,
        messages: Vec<Message>,
        system: Option<SystemPrompt>,
        tools: Vec<ToolDefinition>,
        thinking: Option<ThinkingConfig>,
        stream: bool,
    ) -> MessageRequest {
        MessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages,
            system,
            tools: if tools.is_empty() { None } else { Some(tools) },
            thinking,
            temperature: None,
            stream: if stream { Some(true) } else { None },
        }
    }

    /// POST the request, retrying on connection errors and retryable statuses
    async fn post_with_retry(&self, request: &MessageRequest) -> Result<Response> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = serde_json::to_string(request).context("Failed to serialize request")?;
        tracing::debug!("[Anthropic] Request JSON: {} bytes", body.len());

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let started = Instant::now();

            let result = self
                .client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .header("content-type", "application/json")
                .body(body.clone())
                .send()
                .await;

            let duration_ms = started.elapsed().as_millis() as u64;

            let (retry_after, failure) = match result {
                Ok(response) if response.status().is_success() => {
                    tracing::info!(
                        attempt,
                        duration_ms,
                        model = %request.model,
                        "[Anthropic] Request succeeded"
                    );
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status();
                    let retry_after = retry_after_header(&response);
                    let text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Failed to read error body".to_string());
                    let err = ApiRequestError::from_body(status.as_u16(), &text);
                    tracing::warn!(
                        attempt,
                        duration_ms,
                        status = status.as_u16(),
                        error = %err.message,
                        "[Anthropic] Request failed"
                    );
                    if !err.is_retryable() || attempt > self.max_retries {
                        return Err(anyhow::Error::new(err));
                    }
                    (retry_after, err.to_string())
                }
                Err(e) => {
                    tracing::warn!(attempt, duration_ms, error = %e, "[Anthropic] Connection error");
                    if attempt > self.max_retries {
                        return Err(anyhow::Error::new(e).context("Failed to send request to Anthropic API"));
                    }
                    (None, e.to_string())
                }
            };

            let delay = retry_after.unwrap_or_else(|| backoff_delay(attempt));
            tracing::info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %failure,
                "[Anthropic] Retrying request"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Exponential backoff capped at `MAX_RETRY_DELAY_MS`
fn backoff_delay(attempt: u32) -> Duration {
    let exp = BASE_RETRY_DELAY_MS.saturating_mul(1u64 << attempt.saturating_sub(1).min(10));
    Duration::from_millis(exp.min(MAX_RETRY_DELAY_MS))
}

fn retry_after_header(response: &Response) -> Option<Duration> {
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs).min(Duration::from_millis(MAX_RETRY_DELAY_MS)))
}

/// Parse one SSE `data:` payload into a stream event
fn parse_sse_data(data: &str) -> Result<Option<StreamEvent>> {
    let raw: RawStreamEvent = match serde_json::from_str(data) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!("[Anthropic] Skipping unparseable stream event: {}", e);
            return Ok(None);
        }
    };
    match raw.into_stream_event() {
        StreamEvent::Error(details) => Err(anyhow::Error::new(ApiRequestError::from_stream(
            &details.error_type,
            &details.message,
        ))),
        event => Ok(Some(event)),
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn send_message(
        &self,
        user_message: &str,
        conversation_history: &[Message],
        system_prompt: Option<&str>,
    ) -> Result<String> {
        let mut messages = conversation_history.to_vec();
        messages.push(Message::user(user_message));
        let system = system_prompt.map(|s| SystemPrompt::Text(s.to_string()));

        let response = self
            .send_with_tools_and_system(messages, system, Vec::new(), None)
            .await?;
        Ok(response.text())
    }

    async fn send_with_tools_and_system(
        &self,
        messages: Vec<Message>,
        system: Option<SystemPrompt>,
        tools: Vec<ToolDefinition>,
        thinking: Option<ThinkingConfig>,
    ) -> Result<MessageResponse> {
        let request = self.build_request(messages, system, tools, thinking, false);
        let response = self.post_with_retry(&request).await?;
        response
            .json::<MessageResponse>()
            .await
            .context("Failed to parse Anthropic response")
    }

    async fn stream_with_tools_and_system(
        &self,
        messages: Vec<Message>,
        system: Option<SystemPrompt>,
        tools: Vec<ToolDefinition>,
        thinking: Option<ThinkingConfig>,
    ) -> Result<EventStream> {
        let request = self.build_request(messages, system, tools, thinking, true);
        let response = self.post_with_retry(&request).await?;

        tracing::info!("[Anthropic] Streaming response started");

        let byte_stream = response.bytes_stream();
        let stream_reader = StreamReader::new(
            byte_stream.map(|result| result.map_err(|e| std::io::Error::other(e.to_string()))),
        );
        let buf_reader = tokio::io::BufReader::new(stream_reader);

        let stream = async_stream::try_stream! {
            let mut lines = buf_reader.lines();
            while let Some(line) = lines.next_line().await? {
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim_start();
                if data.is_empty() {
                    continue;
                }
                if let Some(event) = parse_sse_data(data)? {
                    let done = matches!(event, StreamEvent::MessageStop);
                    yield event;
                    if done {
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn model(&self) -> String {
        self.model.clone()
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }

    fn create_variant(&self, model: &str, max_tokens: u32) -> Arc<dyn LlmProvider> {
        Arc::new(self.clone().with_model(model).with_max_tokens(max_tokens))
    }
}
