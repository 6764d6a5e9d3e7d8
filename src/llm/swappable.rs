//! Swappable LLM provider for runtime model switching
//!
//! Wraps any `LlmProvider` and allows swapping the underlying provider at
//! runtime. The turn loop uses this to fall back to a secondary model when
//! the primary one is rate limited or overloaded.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::provider::{EventStream, LlmProvider};
use super::types::{Message, MessageResponse, SystemPrompt, ThinkingConfig, ToolDefinition};

/// A provider that delegates to an inner provider which can be changed at
/// runtime.
///
/// The agent sees this as a normal `Arc<dyn LlmProvider>`. The
/// [`LlmProviderHandle`] swaps the underlying provider between requests.
pub struct SwappableLlmProvider {
    inner: Arc<RwLock<Arc<dyn LlmProvider>>>,
}

impl SwappableLlmProvider {
    /// Create a new swappable provider wrapping the given initial provider.
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(provider)),
        }
    }

    /// Get a handle that can be used to swap the provider.
    pub fn handle(&self) -> LlmProviderHandle {
        LlmProviderHandle {
            inner: self.inner.clone(),
        }
    }

    async fn current(&self) -> Arc<dyn LlmProvider> {
        self.inner.read().await.clone()
    }
}

/// Handle for swapping the LLM provider from outside a request.
#[derive(Clone)]
pub struct LlmProviderHandle {
    inner: Arc<RwLock<Arc<dyn LlmProvider>>>,
}

impl LlmProviderHandle {
    /// Swap the underlying LLM provider.
    ///
    /// In-flight requests that already hold the old provider finish on it.
    pub async fn set_provider(&self, provider: Arc<dyn LlmProvider>) {
        let mut guard = self.inner.write().await;
        tracing::info!(from = %guard.model(), to = %provider.model(), "Swapping model provider");
        *guard = provider;
    }

    /// Get the current model name.
    pub async fn current_model(&self) -> String {
        self.inner.read().await.model()
    }

    /// Build a variant of the current provider for another model
    pub async fn variant(&self, model: &str, max_tokens: u32) -> Arc<dyn LlmProvider> {
        self.inner.read().await.create_variant(model, max_tokens)
    }
}

#[async_trait::async_trait]
impl LlmProvider for SwappableLlmProvider {
    async fn send_message(
        &self,
        user_message: &str,
        conversation_history: &[Message],
        system_prompt: Option<&str>,
    ) -> Result<String> {
        self.current()
            .await
            .send_message(user_message, conversation_history, system_prompt)
            .await
    }

    async fn send_with_tools_and_system(
        &self,
        messages: Vec<Message>,
        system: Option<SystemPrompt>,
        tools: Vec<ToolDefinition>,
        thinking: Option<ThinkingConfig>,
    ) -> Result<MessageResponse> {
        self.current()
            .await
            .send_with_tools_and_system(messages, system, tools, thinking)
            .await
    }

    async fn stream_with_tools_and_system(
        &self,
        messages: Vec<Message>,
        system: Option<SystemPrompt>,
        tools: Vec<ToolDefinition>,
        thinking: Option<ThinkingConfig>,
    ) -> Result<EventStream> {
        self.current()
            .await
            .stream_with_tools_and_system(messages, system, tools, thinking)
            .await
    }

    fn model(&self) -> String {
        match self.inner.try_read() {
            Ok(guard) => guard.model(),
            Err(_) => String::new(),
        }
    }

    fn provider_name(&self) -> &'static str {
        match self.inner.try_read() {
            Ok(guard) => guard.provider_name(),
            Err(_) => "swappable",
        }
    }

    fn create_variant(&self, model: &str, max_tokens: u32) -> Arc<dyn LlmProvider> {
        // Variants are fixed-model clones of whatever is current
        match self.inner.try_read() {
            Ok(guard) => guard.create_variant(model, max_tokens),
            Err(_) => Arc::new(Self {
                inner: self.inner.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedProvider;

    #[tokio::test]
    async fn test_swap_changes_model() {
        let primary: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider::new("primary"));
        let swappable = SwappableLlmProvider::new(primary);
        let handle = swappable.handle();
        assert_eq!(swappable.model(), "primary");

        let fallback = handle.variant("fallback", 1024).await;
        handle.set_provider(fallback).await;

        assert_eq!(swappable.model(), "fallback");
        assert_eq!(handle.current_model().await, "fallback");
    }
}
