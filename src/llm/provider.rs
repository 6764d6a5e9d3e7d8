//! LLM Provider trait
//!
//! Abstracts the model interface so the turn loop, the compactor and the
//! command prefix detector can run against the HTTP provider or a scripted
//! test double.

use anyhow::Result;
use futures::stream::Stream;
use std::pin::Pin;
use std::sync::Arc;

use super::types::{
    Message, MessageResponse, StreamEvent, SystemPrompt, ThinkingConfig, ToolDefinition,
};

/// Boxed stream of server-sent events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Trait for LLM providers used by the agent.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a simple message and get a text response (no tool calling).
    ///
    /// Used by the compactor and the command prefix detector.
    async fn send_message(
        &self,
        user_message: &str,
        conversation_history: &[Message],
        system_prompt: Option<&str>,
    ) -> Result<String>;

    /// Send a request with tools and system prompt, returning the full response.
    async fn send_with_tools_and_system(
        &self,
        messages: Vec<Message>,
        system: Option<SystemPrompt>,
        tools: Vec<ToolDefinition>,
        thinking: Option<ThinkingConfig>,
    ) -> Result<MessageResponse>;

    /// Stream a request with tools and system prompt.
    ///
    /// Returns an async stream of StreamEvent that yields events as they arrive.
    async fn stream_with_tools_and_system(
        &self,
        messages: Vec<Message>,
        system: Option<SystemPrompt>,
        tools: Vec<ToolDefinition>,
        thinking: Option<ThinkingConfig>,
    ) -> Result<EventStream>;

    /// Get the current model name.
    fn model(&self) -> String;

    /// Get the provider name (e.g., "anthropic").
    fn provider_name(&self) -> &'static str;

    /// Create a variant of this provider with a different model and max tokens.
    ///
    /// Shares the same credentials. Used for the small fast model and for
    /// the fallback model.
    fn create_variant(&self, model: &str, max_tokens: u32) -> Arc<dyn LlmProvider>;
}
