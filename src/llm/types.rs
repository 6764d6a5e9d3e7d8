//! Anthropic API types matching the Messages REST API
//!
//! These types serialize/deserialize with the Messages API wire format and
//! double as the in-memory conversation representation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Cache Control
// ============================================================================

/// Cache control configuration for prompt caching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheControl {
    /// Cache type (always "ephemeral")
    #[serde(rename = "type")]
    pub cache_type: String,
}

impl CacheControl {
    /// Create ephemeral cache control
    pub fn ephemeral() -> Self {
        Self {
            cache_type: "ephemeral".to_string(),
        }
    }
}

// ============================================================================
// Request Types
// ============================================================================

/// System prompt - either a simple string or array of text blocks (for caching)
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    /// Simple text system prompt
    Text(String),
    /// Array of text blocks (for prompt caching)
    Blocks(Vec<SystemBlock>),
}

impl SystemPrompt {
    /// A single cached text block
    pub fn cached(text: impl Into<String>) -> Self {
        SystemPrompt::Blocks(vec![
            SystemBlock::new(text).with_cache_control(CacheControl::ephemeral())
        ])
    }
}

/// System block with cache control
#[derive(Debug, Clone, Serialize)]
pub struct SystemBlock {
    /// Type (always "text")
    #[serde(rename = "type")]
    pub block_type: String,
    /// Text content
    pub text: String,
    /// Cache control (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl SystemBlock {
    /// Create a new system block
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            block_type: "text".to_string(),
            text: text.into(),
            cache_control: None,
        }
    }

    /// Add cache control to this block
    pub fn with_cache_control(mut self, cache_control: CacheControl) -> Self {
        self.cache_control = Some(cache_control);
        self
    }
}

/// Request body for the Anthropic Messages API
#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    /// The model to use
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Input messages
    pub messages: Vec<Message>,

    /// System prompt (optional) - can be string or array of blocks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,

    /// Tools available to the model (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,

    /// Extended thinking configuration (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,

    /// Temperature for sampling (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Whether to stream the response (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// Extended thinking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingConfig {
    /// Type of thinking ("enabled")
    #[serde(rename = "type")]
    pub thinking_type: String,

    /// Budget tokens for thinking
    pub budget_tokens: u32,
}

impl ThinkingConfig {
    /// Create a new thinking config with enabled thinking
    pub fn enabled(budget_tokens: u32) -> Self {
        Self {
            thinking_type: "enabled".to_string(),
            budget_tokens,
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender ("user" or "assistant")
    pub role: String,

    /// Content of the message - can be a string or array of content blocks
    pub content: MessageContent,
}

/// Message content - either a simple string or array of content blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content
    Text(String),
    /// Array of content blocks (for tool use, tool results, thinking, etc.)
    Blocks(Vec<ContentBlock>),
}

impl Message {
    /// Create a simple user message with text content
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    /// Create a simple assistant message with text content
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    /// Create a user message with content blocks (for tool results)
    pub fn user_with_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Create an assistant message with content blocks (for tool use)
    pub fn assistant_with_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Whether this is a user message
    pub fn is_user(&self) -> bool {
        self.role == "user"
    }

    /// Get content blocks if this message has blocks
    pub fn blocks(&self) -> Option<&[ContentBlock]> {
        match &self.content {
            MessageContent::Text(_) => None,
            MessageContent::Blocks(blocks) => Some(blocks),
        }
    }

    /// Concatenated text of the message, ignoring non-text blocks
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| b.as_text())
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Tool use blocks carried by this message
    pub fn tool_uses(&self) -> Vec<(&str, &str, &Value)> {
        self.blocks()
            .map(|blocks| blocks.iter().filter_map(|b| b.as_tool_use()).collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// Content Blocks
// ============================================================================

/// Content block in a message - supports text, tool_use, tool_result, and thinking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    /// Text content
    #[serde(rename = "text")]
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },

    /// Tool use request from the model
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },

    /// Tool result from the user
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },

    /// Thinking block (for extended thinking)
    #[serde(rename = "thinking")]
    Thinking { thinking: String, signature: String },

    /// Redacted thinking block
    #[serde(rename = "redacted_thinking")]
    RedactedThinking { data: String },
}

impl ContentBlock {
    /// Create a text content block
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text {
            text: text.into(),
            cache_control: None,
        }
    }

    /// Create a tool use content block
    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    /// Create a tool result content block
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: Some(content.into()),
            is_error: if is_error { Some(true) } else { None },
        }
    }

    /// Get the text content if this is a text block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text, .. } => Some(text.as_str()),
            _ => None,
        }
    }

    /// Get the tool use info if this is a tool use block
    pub fn as_tool_use(&self) -> Option<(&str, &str, &Value)> {
        match self {
            ContentBlock::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
            _ => None,
        }
    }
}

// ============================================================================
// Tool Definitions
// ============================================================================

/// Tool definition for the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,

    /// Tool description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON schema for the tool input
    pub input_schema: ToolInputSchema,
}

/// JSON schema for tool input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    /// Type (always "object")
    #[serde(rename = "type")]
    pub schema_type: String,

    /// Properties of the input object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,

    /// Required properties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl ToolInputSchema {
    /// Create a new tool input schema
    pub fn new() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: None,
            required: None,
        }
    }

    /// Set the properties
    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Set the required fields
    pub fn with_required(mut self, required: &[&str]) -> Self {
        self.required = Some(required.iter().map(|s| s.to_string()).collect());
        self
    }
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Response from the Anthropic Messages API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Unique message ID
    pub id: String,

    /// Type (always "message")
    #[serde(rename = "type")]
    pub response_type: String,

    /// Role (always "assistant")
    pub role: String,

    /// Content blocks in the response
    pub content: Vec<ContentBlock>,

    /// Model used
    pub model: String,

    /// Reason for stopping
    pub stop_reason: Option<StopReason>,

    /// Stop sequence that was matched (if any)
    pub stop_sequence: Option<String>,

    /// Token usage
    pub usage: Usage,
}

impl MessageResponse {
    /// Get all text content from the response
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| block.as_text())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Reason why the model stopped generating
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Model reached a natural stopping point
    EndTurn,
    /// Max tokens reached
    MaxTokens,
    /// Stop sequence matched
    StopSequence,
    /// Model invoked tools
    ToolUse,
    /// Long-running turn was paused
    PauseTurn,
    /// Policy violation refusal
    Refusal,
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens used
    #[serde(default)]
    pub input_tokens: u32,

    /// Output tokens generated
    #[serde(default)]
    pub output_tokens: u32,

    /// Cache creation tokens (if caching enabled)
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u32>,

    /// Cache read tokens (if caching enabled)
    #[serde(default)]
    pub cache_read_input_tokens: Option<u32>,
}

impl Usage {
    /// Tokens the request occupied in the context window
    pub fn context_tokens(&self) -> u32 {
        self.input_tokens
            + self.output_tokens
            + self.cache_creation_input_tokens.unwrap_or(0)
            + self.cache_read_input_tokens.unwrap_or(0)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error body returned by the Anthropic API
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error type
    #[serde(rename = "type")]
    pub error_type: String,

    /// Error details
    pub error: ApiErrorDetails,
}

/// Details of an API error
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetails {
    /// Error type
    #[serde(rename = "type")]
    pub error_type: String,

    /// Error message
    pub message: String,
}

// ============================================================================
// Streaming Types
// ============================================================================

/// Server-sent event from the streaming API
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Initial message with metadata
    MessageStart(MessageStartEvent),
    /// Start of a content block
    ContentBlockStart(ContentBlockStartEvent),
    /// Delta update to a content block
    ContentBlockDelta(ContentBlockDeltaEvent),
    /// End of a content block
    ContentBlockStop(ContentBlockStopEvent),
    /// Final message delta with stop reason and usage
    MessageDelta(MessageDeltaEvent),
    /// Stream complete
    MessageStop,
    /// Keep-alive ping
    Ping,
    /// Error event
    Error(StreamErrorDetails),
}

/// Event data for message_start
#[derive(Debug, Clone, Deserialize)]
pub struct MessageStartEvent {
    /// The message object (with empty content)
    pub message: MessageStartData,
}

/// Message data in message_start event
#[derive(Debug, Clone, Deserialize)]
pub struct MessageStartData {
    /// Unique message ID
    pub id: String,
    /// Model used
    pub model: String,
    /// Initial usage
    #[serde(default)]
    pub usage: Usage,
}

/// Event data for content_block_start
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlockStartEvent {
    /// Index of this content block
    pub index: usize,
    /// The content block (type only, content is empty)
    pub content_block: ContentBlockStart,
}

/// Content block start data
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlockStart {
    /// Text block start
    #[serde(rename = "text")]
    Text { text: String },
    /// Tool use block start
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String },
    /// Thinking block start
    #[serde(rename = "thinking")]
    Thinking { thinking: String },
    /// Redacted thinking arrives complete
    #[serde(rename = "redacted_thinking")]
    RedactedThinking { data: String },
}

/// Event data for content_block_delta
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlockDeltaEvent {
    /// Index of the content block being updated
    pub index: usize,
    /// The delta update
    pub delta: ContentDelta,
}

/// Delta types for content block updates
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentDelta {
    /// Text delta
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    /// JSON delta for tool input
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
    /// Thinking delta
    #[serde(rename = "thinking_delta")]
    ThinkingDelta { thinking: String },
    /// Signature delta (at end of thinking block)
    #[serde(rename = "signature_delta")]
    SignatureDelta { signature: String },
}

/// Event data for content_block_stop
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlockStopEvent {
    /// Index of the content block that stopped
    pub index: usize,
}

/// Event data for message_delta
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeltaEvent {
    /// Delta changes to the message
    pub delta: MessageDeltaData,
    /// Cumulative usage
    pub usage: DeltaUsage,
}

/// Delta data in message_delta event
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeltaData {
    /// Stop reason
    pub stop_reason: Option<StopReason>,
    /// Stop sequence
    pub stop_sequence: Option<String>,
}

/// Usage in delta events (may only have output_tokens)
#[derive(Debug, Clone, Deserialize)]
pub struct DeltaUsage {
    /// Output tokens (cumulative)
    pub output_tokens: u32,
}

/// Stream error details
#[derive(Debug, Clone, Deserialize)]
pub struct StreamErrorDetails {
    /// Error type
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message
    pub message: String,
}

/// Raw SSE event data structure for deserialization
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum RawStreamEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: MessageStartData },
    #[serde(rename = "content_block_start")]
    ContentBlockStart {
        index: usize,
        content_block: ContentBlockStart,
    },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: usize, delta: ContentDelta },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop { index: usize },
    #[serde(rename = "message_delta")]
    MessageDelta {
        delta: MessageDeltaData,
        usage: DeltaUsage,
    },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "error")]
    Error { error: StreamErrorDetails },
}

impl RawStreamEvent {
    /// Convert to StreamEvent
    pub fn into_stream_event(self) -> StreamEvent {
        match self {
            RawStreamEvent::MessageStart { message } => {
                StreamEvent::MessageStart(MessageStartEvent { message })
            }
            RawStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => StreamEvent::ContentBlockStart(ContentBlockStartEvent {
                index,
                content_block,
            }),
            RawStreamEvent::ContentBlockDelta { index, delta } => {
                StreamEvent::ContentBlockDelta(ContentBlockDeltaEvent { index, delta })
            }
            RawStreamEvent::ContentBlockStop { index } => {
                StreamEvent::ContentBlockStop(ContentBlockStopEvent { index })
            }
            RawStreamEvent::MessageDelta { delta, usage } => {
                StreamEvent::MessageDelta(MessageDeltaEvent { delta, usage })
            }
            RawStreamEvent::MessageStop => StreamEvent::MessageStop,
            RawStreamEvent::Ping => StreamEvent::Ping,
            RawStreamEvent::Error { error } => StreamEvent::Error(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_serialization() {
        let msg = Message::user("Hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("\"content\":\"Hello\""));
    }

    #[test]
    fn test_tool_result_serialization() {
        let block = ContentBlock::tool_result("toolu_123", "output", false);
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains("\"type\":\"tool_result\""));
        assert!(json.contains("\"tool_use_id\":\"toolu_123\""));
        assert!(!json.contains("is_error"));
    }

    #[test]
    fn test_message_tool_uses_and_text() {
        let msg = Message::assistant_with_blocks(vec![
            ContentBlock::text("Let me look. "),
            ContentBlock::tool_use("t1", "Read", json!({"file_path": "a.rs"})),
            ContentBlock::text("Done."),
        ]);
        assert_eq!(msg.text(), "Let me look. Done.");
        let uses = msg.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].1, "Read");
    }

    #[test]
    fn test_stream_event_deserialization() {
        let json = r#"{"type": "ping"}"#;
        let event: RawStreamEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, RawStreamEvent::Ping));
    }

    #[test]
    fn test_tool_use_start_ignores_empty_input() {
        let json = r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"Bash","input":{}}}"#;
        let event: RawStreamEvent = serde_json::from_str(json).unwrap();
        match event.into_stream_event() {
            StreamEvent::ContentBlockStart(start) => {
                assert_eq!(start.index, 1);
                assert!(matches!(
                    start.content_block,
                    ContentBlockStart::ToolUse { ref name, .. } if name == "Bash"
                ));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_usage_context_tokens() {
        let usage = Usage {
            input_tokens: 100,
            output_tokens: 20,
            cache_creation_input_tokens: Some(5),
            cache_read_input_tokens: None,
        };
        assert_eq!(usage.context_tokens(), 125);
    }
}
