//! Model client: Messages API types, the provider trait and its implementations

pub mod anthropic;
pub mod error;
pub mod provider;
pub mod swappable;
pub mod types;

#[cfg(test)]
pub mod mock;

pub use anthropic::{AnthropicProvider, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_SMALL_FAST_MODEL};
pub use error::{find_api_error, ApiRequestError};
pub use provider::{EventStream, LlmProvider};
pub use swappable::{LlmProviderHandle, SwappableLlmProvider};
pub use types::{
    CacheControl, ContentBlock, ContentBlockStart, ContentDelta, Message, MessageContent,
    MessageRequest, MessageResponse, StopReason, StreamEvent, SystemBlock, SystemPrompt,
    ThinkingConfig, ToolDefinition, ToolInputSchema, Usage,
};
